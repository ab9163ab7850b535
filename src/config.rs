use rust_decimal::RoundingStrategy;

/// Seed values for the primary currency created when the currency table is empty.
#[derive(Debug, Clone)]
pub struct DefaultCurrencyConfig {
    pub identifier: String,
    pub name: String,
    pub symbol: String,
    pub precision: i16,
    pub default_max_balance: i64,
    pub console_log: bool,
}

impl Default for DefaultCurrencyConfig {
    fn default() -> Self {
        Self {
            identifier: "coin".to_string(),
            name: "Coin".to_string(),
            symbol: "$".to_string(),
            precision: 2,
            default_max_balance: -1,
            console_log: false,
        }
    }
}

/// Recognized configuration surface, spec section 6. Loaded from environment
/// variables the same way the teacher's `main.rs` loads `DATABASE_URL` /
/// `JWT_SECRET` — plain `env::var(..).unwrap_or_else(..)`, no config crate.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    pub datasource_key: String,
    pub default_currency: DefaultCurrencyConfig,
    pub rounding_mode: RoundingMode,
    pub async_shutdown_wait_seconds: u64,
    pub backup_max_snapshots: usize,
}

/// Spec section 6's `rounding-mode` option.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundingMode {
    Up,
    Down,
    Ceiling,
    Floor,
    HalfUp,
    HalfDown,
    HalfEven,
}

impl RoundingMode {
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_uppercase().as_str() {
            "UP" => RoundingMode::Up,
            "DOWN" => RoundingMode::Down,
            "CEILING" => RoundingMode::Ceiling,
            "FLOOR" => RoundingMode::Floor,
            "HALF_UP" => RoundingMode::HalfUp,
            "HALF_DOWN" => RoundingMode::HalfDown,
            "HALF_EVEN" => RoundingMode::HalfEven,
            _ => RoundingMode::Down,
        }
    }

    pub fn as_strategy(self) -> RoundingStrategy {
        match self {
            RoundingMode::Up => RoundingStrategy::AwayFromZero,
            RoundingMode::Down => RoundingStrategy::ToZero,
            RoundingMode::Ceiling => RoundingStrategy::ToPositiveInfinity,
            RoundingMode::Floor => RoundingStrategy::ToNegativeInfinity,
            RoundingMode::HalfUp => RoundingStrategy::MidpointAwayFromZero,
            RoundingMode::HalfDown => RoundingStrategy::MidpointTowardZero,
            RoundingMode::HalfEven => RoundingStrategy::MidpointNearestEven,
        }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            datasource_key: "default".to_string(),
            default_currency: DefaultCurrencyConfig::default(),
            rounding_mode: RoundingMode::Down,
            async_shutdown_wait_seconds: 10,
            backup_max_snapshots: 50,
        }
    }
}

impl LedgerConfig {
    /// Load from environment, falling back to defaults for anything unset.
    pub fn from_env() -> Self {
        let default = LedgerConfig::default();
        Self {
            datasource_key: std::env::var("DATASOURCE_KEY")
                .unwrap_or(default.datasource_key),
            default_currency: DefaultCurrencyConfig {
                identifier: std::env::var("DEFAULT_CURRENCY__IDENTIFIER")
                    .unwrap_or(default.default_currency.identifier),
                name: std::env::var("DEFAULT_CURRENCY__NAME")
                    .unwrap_or(default.default_currency.name),
                symbol: std::env::var("DEFAULT_CURRENCY__SYMBOL")
                    .unwrap_or(default.default_currency.symbol),
                precision: std::env::var("DEFAULT_CURRENCY__PRECISION")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(default.default_currency.precision),
                default_max_balance: std::env::var("DEFAULT_CURRENCY__DEFAULT_MAX_BALANCE")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(default.default_currency.default_max_balance),
                console_log: std::env::var("DEFAULT_CURRENCY__CONSOLE_LOG")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(default.default_currency.console_log),
            },
            rounding_mode: std::env::var("ROUNDING_MODE")
                .map(|v| RoundingMode::parse(&v))
                .unwrap_or(default.rounding_mode),
            async_shutdown_wait_seconds: std::env::var("ASYNC__SHUTDOWN_WAIT_SECONDS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.async_shutdown_wait_seconds),
            backup_max_snapshots: std::env::var("BACKUP__MAX_SNAPSHOTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.backup_max_snapshots),
        }
    }
}
