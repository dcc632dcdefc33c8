use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub security: SecurityConfig,
    pub redis: RedisConfig,
    pub cache: CacheConfig,
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub jwt_secret: String,
    pub token_ttl_secs: u64,
    pub refresh_ttl_secs: u64,
    pub enable_cors: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    pub url: String,
    /// Per-command timeout; after this the store degrades to a miss.
    pub command_timeout_ms: u64,
    /// Namespace prefix for every key this service writes.
    pub key_prefix: String,
}

/// One entry of the path→TTL table. Resolution is first configured substring
/// match, so the order of `CacheConfig::ttl_rules` is load-bearing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtlRule {
    pub category: String,
    pub ttl_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub enabled: bool,
    pub default_ttl_secs: u64,
    pub ttl_rules: Vec<TtlRule>,
    /// Path prefixes that are never cached.
    pub no_cache_paths: Vec<String>,
    /// TTL jitter as a percentage (10 = ±10%), spreading expiry to avoid
    /// synchronized mass recomputation.
    pub jitter_percent: u8,
    /// Responses larger than this are not cached.
    pub max_body_bytes: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RateRule {
    pub limit: u64,
    pub period_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub default: RateRule,
    pub anonymous: RateRule,
    pub authenticated: RateRule,
    pub admin: RateRule,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        // Set defaults based on environment, then override with specific env vars
        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        // Security overrides
        if let Ok(v) = env::var("JWT_SECRET") {
            self.security.jwt_secret = v;
        }
        if let Ok(v) = env::var("JWT_TOKEN_TTL_SECS") {
            self.security.token_ttl_secs = v.parse().unwrap_or(self.security.token_ttl_secs);
        }
        if let Ok(v) = env::var("JWT_REFRESH_TTL_SECS") {
            self.security.refresh_ttl_secs = v.parse().unwrap_or(self.security.refresh_ttl_secs);
        }
        if let Ok(v) = env::var("SECURITY_ENABLE_CORS") {
            self.security.enable_cors = v.parse().unwrap_or(self.security.enable_cors);
        }

        // Redis overrides
        if let Ok(v) = env::var("REDIS_URL") {
            self.redis.url = v;
        }
        if let Ok(v) = env::var("REDIS_COMMAND_TIMEOUT_MS") {
            self.redis.command_timeout_ms = v.parse().unwrap_or(self.redis.command_timeout_ms);
        }
        if let Ok(v) = env::var("REDIS_KEY_PREFIX") {
            self.redis.key_prefix = v;
        }

        // Cache overrides
        if let Ok(v) = env::var("CACHE_ENABLED") {
            self.cache.enabled = v.parse().unwrap_or(self.cache.enabled);
        }
        if let Ok(v) = env::var("CACHE_DEFAULT_TTL_SECS") {
            self.cache.default_ttl_secs = v.parse().unwrap_or(self.cache.default_ttl_secs);
        }
        if let Ok(v) = env::var("CACHE_JITTER_PERCENT") {
            self.cache.jitter_percent = v.parse().unwrap_or(self.cache.jitter_percent);
        }
        if let Ok(v) = env::var("CACHE_MAX_BODY_BYTES") {
            self.cache.max_body_bytes = v.parse().unwrap_or(self.cache.max_body_bytes);
        }

        // Rate limit overrides
        if let Ok(v) = env::var("RATE_LIMIT_ENABLED") {
            self.rate_limit.enabled = v.parse().unwrap_or(self.rate_limit.enabled);
        }

        self
    }

    /// Path→TTL table in resolution order. Some categories are substrings of
    /// others ("user" vs "user_profile"); the first configured match wins, so
    /// this order intentionally mirrors the deployed configuration.
    fn default_ttl_rules() -> Vec<TtlRule> {
        let rules: [(&str, u64); 12] = [
            // User related
            ("user", 3600 * 24),
            ("user_profile", 3600 * 2),
            ("user_permissions", 3600 * 12),
            // Data related
            ("dataset", 3600 * 4),
            ("dataset_list", 300),
            ("data_table", 1800),
            ("data_preview", 600),
            // Matching related
            ("match_rules", 3600 * 8),
            ("match_results", 3600 * 2),
            // System related
            ("system_settings", 3600 * 24),
            ("api_response", 120),
            ("health_status", 60),
        ];
        rules
            .into_iter()
            .map(|(category, ttl_secs)| TtlRule {
                category: category.to_string(),
                ttl_secs,
            })
            .collect()
    }

    fn default_no_cache_paths() -> Vec<String> {
        [
            "/auth",
            "/api/auth",
            "/api/admin",
            "/api/upload",
            "/api/user/password",
        ]
        .into_iter()
        .map(String::from)
        .collect()
    }

    fn default_rate_limits() -> RateLimitConfig {
        RateLimitConfig {
            enabled: true,
            default: RateRule { limit: 100, period_secs: 60 },
            anonymous: RateRule { limit: 50, period_secs: 60 },
            authenticated: RateRule { limit: 200, period_secs: 60 },
            admin: RateRule { limit: 500, period_secs: 60 },
        }
    }

    pub fn development() -> Self {
        Self {
            environment: Environment::Development,
            security: SecurityConfig {
                jwt_secret: "dev-jwt-secret".to_string(),
                token_ttl_secs: 3600,
                refresh_ttl_secs: 3600 * 24 * 7,
                enable_cors: true,
            },
            redis: RedisConfig {
                url: "redis://127.0.0.1:6379/0".to_string(),
                command_timeout_ms: 5000,
                key_prefix: "ecohub".to_string(),
            },
            cache: CacheConfig {
                enabled: true,
                default_ttl_secs: 3600,
                ttl_rules: Self::default_ttl_rules(),
                no_cache_paths: Self::default_no_cache_paths(),
                jitter_percent: 10,
                max_body_bytes: 1024 * 1024,
            },
            rate_limit: Self::default_rate_limits(),
        }
    }

    pub fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            security: SecurityConfig {
                jwt_secret: String::new(), // must come from JWT_SECRET
                token_ttl_secs: 3600,
                refresh_ttl_secs: 3600 * 24 * 7,
                enable_cors: true,
            },
            redis: RedisConfig {
                url: "redis://redis:6379/0".to_string(),
                command_timeout_ms: 5000,
                key_prefix: "ecohub".to_string(),
            },
            cache: CacheConfig {
                enabled: true,
                default_ttl_secs: 3600,
                ttl_rules: Self::default_ttl_rules(),
                no_cache_paths: Self::default_no_cache_paths(),
                jitter_percent: 10,
                max_body_bytes: 1024 * 1024,
            },
            rate_limit: Self::default_rate_limits(),
        }
    }

    pub fn production() -> Self {
        Self {
            environment: Environment::Production,
            security: SecurityConfig {
                jwt_secret: String::new(), // must come from JWT_SECRET
                token_ttl_secs: 3600,
                refresh_ttl_secs: 3600 * 24 * 7,
                enable_cors: true,
            },
            redis: RedisConfig {
                url: "redis://redis:6379/0".to_string(),
                command_timeout_ms: 2000,
                key_prefix: "ecohub".to_string(),
            },
            cache: CacheConfig {
                enabled: true,
                default_ttl_secs: 3600,
                ttl_rules: Self::default_ttl_rules(),
                no_cache_paths: Self::default_no_cache_paths(),
                jitter_percent: 10,
                max_body_bytes: 1024 * 1024,
            },
            rate_limit: Self::default_rate_limits(),
        }
    }
}
