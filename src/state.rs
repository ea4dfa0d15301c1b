use std::time::Duration;

use bb8::Pool;
use bb8_redis::RedisConnectionManager;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use crate::connection::ConnectionManager;
use crate::errors::AppError;
use crate::lobby::actor::RoomActorRegistry;
use crate::middleware::GameApiRateLimiter;

/// Exhaustive configuration surface for the core (§6).
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub client_url: String,
    pub ping_timeout_secs: u64,
    pub ping_interval_secs: u64,
    pub session_timeout_minutes: i64,
    pub idle_room_cleanup_minutes: i64,
    pub rate_limit_default_per_min: u32,
    pub gamebuddies_api_key: String,
    pub database_url: String,
    pub db_admin_key: String,
    pub redis_url: String,
    pub return_grace_seconds: i64,
    pub max_conn_per_user: usize,
    pub identity_jwt_secret: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        fn required(key: &str) -> Result<String, AppError> {
            std::env::var(key).map_err(|_| AppError::EnvError(format!("{key} is required")))
        }

        fn optional_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
            std::env::var(key)
                .ok()
                .and_then(|s| s.parse::<T>().ok())
                .unwrap_or(default)
        }

        Ok(Self {
            client_url: required("CLIENT_URL")?,
            ping_timeout_secs: optional_parsed("PING_TIMEOUT", 60),
            ping_interval_secs: optional_parsed("PING_INTERVAL", 25),
            session_timeout_minutes: optional_parsed("SESSION_TIMEOUT_MINUTES", 180),
            idle_room_cleanup_minutes: optional_parsed("IDLE_ROOM_CLEANUP_MINUTES", 1440),
            rate_limit_default_per_min: optional_parsed("RATE_LIMIT_DEFAULT_PER_MIN", 30),
            gamebuddies_api_key: required("GAMEBUDDIES_API_KEY")?,
            database_url: required("DB_URL")?,
            db_admin_key: required("DB_ADMIN_KEY")?,
            redis_url: required("REDIS_URL")?,
            return_grace_seconds: optional_parsed("RETURN_GRACE_SECONDS", 15),
            max_conn_per_user: optional_parsed("MAX_CONN_PER_USER", 8),
            identity_jwt_secret: required("IDENTITY_JWT_SECRET")?,
        })
    }
}

pub type RedisClient = Pool<RedisConnectionManager>;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub connections: ConnectionManager,
    pub rooms: RoomActorRegistry,
    pub postgres: PgPool,
    pub redis: RedisClient,
    pub http: reqwest::Client,
    pub rate_limiter: GameApiRateLimiter,
}

impl AppState {
    pub async fn new() -> Result<Self, AppError> {
        let config = AppConfig::from_env()?;

        let postgres = PgPoolOptions::new()
            .max_connections(50)
            .min_connections(10)
            .acquire_timeout(Duration::from_secs(5))
            .idle_timeout(Duration::from_secs(300))
            .max_lifetime(Duration::from_secs(1800))
            .connect(&config.database_url)
            .await
            .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        let redis_manager = RedisConnectionManager::new(config.redis_url.clone())
            .map_err(|e| AppError::RedisError(e.to_string()))?;
        let redis = Pool::builder()
            .max_size(100)
            .min_idle(Some(10))
            .connection_timeout(Duration::from_secs(5))
            .max_lifetime(Some(Duration::from_secs(300)))
            .idle_timeout(Some(Duration::from_secs(30)))
            .build(redis_manager)
            .await
            .map_err(|e| AppError::RedisPoolError(e.to_string()))?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .map_err(AppError::ReqwestError)?;

        let connections = ConnectionManager::new(config.max_conn_per_user);
        let rooms = RoomActorRegistry::new();
        let rate_limiter = GameApiRateLimiter::new(config.rate_limit_default_per_min);

        Ok(Self {
            config,
            connections,
            rooms,
            postgres,
            redis,
            http,
            rate_limiter,
        })
    }
}
