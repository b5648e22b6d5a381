use anyhow::{bail, Context, Result};

#[derive(Debug, Clone)]
pub enum Environment {
    Development,
    Testnet,
    Production,
}

/// Which capability variant a currency's daemon speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonKind {
    /// bitcoin-like JSON-RPC wallet (bitcoin, dogecoin)
    Utxo,
    /// account-model wallet RPC (monero-style sub-accounts)
    Monero,
    /// HTTP ledger-API wallet service (baza-style)
    Baza,
}

#[derive(Debug, Clone)]
pub struct CurrencyConfig {
    pub name: String,
    pub kind: DaemonKind,
    pub daemon_url: String,
    pub rpc_user: Option<String>,
    pub rpc_password: Option<String>,
    pub api_key: Option<String>,
    pub min_confirmations: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub environment: Environment,
    pub host: String,
    pub port: u16,

    // Redis (single source of truth for payments/queues/payouts)
    pub redis_url: String,

    // Enabled blockchain daemons
    pub currencies: Vec<CurrencyConfig>,

    // Price oracle
    pub price_api_url: String,
    pub baza_price_url: String,
    pub fiat_currency: String,
    pub price_refresh_secs: u64,

    // Payout batching
    pub payout_sweep_secs: u64,

    // Upper bound on any single daemon call
    pub adapter_timeout_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let environment = Self::parse_environment()?;

        let config = Self {
            environment: environment.clone(),
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .context("Invalid PORT")?,

            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),

            currencies: Self::parse_currencies()?,

            price_api_url: std::env::var("PRICE_API_URL").unwrap_or_else(|_| {
                "https://api.coingecko.com/api/v3/simple/price".to_string()
            }),
            baza_price_url: std::env::var("BAZA_PRICE_URL").unwrap_or_else(|_| {
                "https://www.southxchange.com/api/price/BAZA/TUSD".to_string()
            }),
            fiat_currency: std::env::var("FIAT_CURRENCY").unwrap_or_else(|_| "usd".to_string()),
            price_refresh_secs: std::env::var("PRICE_REFRESH_SECS")
                .unwrap_or_else(|_| "300".to_string())
                .parse()
                .context("Invalid PRICE_REFRESH_SECS")?,

            payout_sweep_secs: std::env::var("PAYOUT_SWEEP_SECS")
                .unwrap_or_else(|_| "1800".to_string())
                .parse()
                .context("Invalid PAYOUT_SWEEP_SECS")?,

            adapter_timeout_secs: std::env::var("ADAPTER_TIMEOUT_SECS")
                .unwrap_or_else(|_| "15".to_string())
                .parse()
                .context("Invalid ADAPTER_TIMEOUT_SECS")?,
        };

        config.validate()?;
        Ok(config)
    }

    fn parse_environment() -> Result<Environment> {
        let env = std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        match env.to_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "testnet" | "test" => Ok(Environment::Testnet),
            "production" | "prod" => Ok(Environment::Production),
            _ => bail!("Unknown environment: {}", env),
        }
    }

    fn parse_currencies() -> Result<Vec<CurrencyConfig>> {
        let enabled = std::env::var("ENABLED_CURRENCIES")
            .unwrap_or_else(|_| "bitcoin".to_string());

        let mut currencies = Vec::new();
        for name in enabled.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            currencies.push(Self::parse_currency(name)?);
        }
        if currencies.is_empty() {
            bail!("ENABLED_CURRENCIES is empty");
        }
        Ok(currencies)
    }

    fn parse_currency(name: &str) -> Result<CurrencyConfig> {
        let prefix = name.to_uppercase();
        let var = |suffix: &str| std::env::var(format!("{}_{}", prefix, suffix));

        let kind = match name {
            "bitcoin" | "dogecoin" => DaemonKind::Utxo,
            "monero" => DaemonKind::Monero,
            "baza" => DaemonKind::Baza,
            _ => bail!("Currency {} is not supported", name),
        };

        let daemon_url = var("DAEMON_URL")
            .with_context(|| format!("{}_DAEMON_URL required", prefix))?;

        let min_confirmations = match kind {
            // Ledger-API wallets have no confirmation concept
            DaemonKind::Baza => None,
            _ => Some(
                var("MIN_CONFIRMATIONS")
                    .unwrap_or_else(|_| "2".to_string())
                    .parse()
                    .with_context(|| format!("Invalid {}_MIN_CONFIRMATIONS", prefix))?,
            ),
        };

        Ok(CurrencyConfig {
            name: name.to_string(),
            kind,
            daemon_url,
            rpc_user: var("RPC_USER").ok(),
            rpc_password: var("RPC_PASSWORD").ok(),
            api_key: var("API_KEY").ok(),
            min_confirmations,
        })
    }

    fn validate(&self) -> Result<()> {
        if !self.price_api_url.starts_with("http") {
            bail!("PRICE_API_URL must be HTTP(S) URL");
        }
        for currency in &self.currencies {
            if !currency.daemon_url.starts_with("http") {
                bail!("{}_DAEMON_URL must be HTTP(S) URL", currency.name.to_uppercase());
            }
            if currency.kind == DaemonKind::Baza && currency.api_key.is_none() {
                bail!("BAZA_API_KEY required");
            }
        }
        if self.adapter_timeout_secs == 0 {
            bail!("ADAPTER_TIMEOUT_SECS must be positive");
        }

        tracing::info!(
            "Configuration validated for {:?} environment ({} currencies)",
            self.environment,
            self.currencies.len()
        );

        Ok(())
    }
}
