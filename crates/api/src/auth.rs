use std::collections::HashMap;

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::Response,
};
use base64::{engine::general_purpose, Engine as _};
use chrono::{Duration, Utc};
use headers::{authorization::Bearer, Authorization, HeaderMapExt};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::ApiError;
use crate::routes::AppState;

pub const API_KEY_HEADER: &str = "X-API-Key";
pub const BEARER_PREFIX: &str = "Bearer ";
/// 认证关闭时注入的开发用户
pub const DEV_USER_ID: &str = "dev-user";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Permission {
    JobRead,
    JobWrite,
    JobExecute,
    NotificationRead,
    NotificationWrite,
    Admin,
}

impl Permission {
    /// 令牌未携带权限时授予的普通用户权限
    pub const DEFAULT_USER: [Permission; 4] = [
        Permission::JobRead,
        Permission::JobWrite,
        Permission::NotificationRead,
        Permission::NotificationWrite,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::JobRead => "JobRead",
            Permission::JobWrite => "JobWrite",
            Permission::JobExecute => "JobExecute",
            Permission::NotificationRead => "NotificationRead",
            Permission::NotificationWrite => "NotificationWrite",
            Permission::Admin => "Admin",
        }
    }
}

pub fn parse_permission(permission_str: &str) -> Option<Permission> {
    match permission_str {
        "JobRead" => Some(Permission::JobRead),
        "JobWrite" => Some(Permission::JobWrite),
        "JobExecute" => Some(Permission::JobExecute),
        "NotificationRead" => Some(Permission::NotificationRead),
        "NotificationWrite" => Some(Permission::NotificationWrite),
        "Admin" => Some(Permission::Admin),
        _ => None,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: i64,
    pub iat: i64,
    #[serde(default)]
    pub permissions: Vec<String>,
    /// 缺省时使用 `sub`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl Claims {
    pub fn effective_user_id(&self) -> &str {
        self.user_id.as_deref().unwrap_or(&self.sub)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("Missing authentication token")]
    MissingToken,
    #[error("Invalid authentication token")]
    InvalidToken,
    #[error("Authentication token has expired")]
    ExpiredToken,
    #[error("Insufficient permissions")]
    InsufficientPermissions,
    #[error("Invalid API key")]
    InvalidApiKey,
}

#[derive(Debug, Clone)]
pub enum AuthType {
    ApiKey(String),
    Jwt,
    Disabled,
}

/// 通过认证的调用方
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: String,
    pub permissions: Vec<Permission>,
    pub auth_type: AuthType,
}

impl AuthenticatedUser {
    pub fn has_permission(&self, permission: Permission) -> bool {
        self.permissions.contains(&permission) || self.permissions.contains(&Permission::Admin)
    }

    pub fn require_permission(&self, permission: Permission) -> Result<(), AuthError> {
        if self.has_permission(permission) {
            Ok(())
        } else {
            warn!(
                user_id = %self.user_id,
                permission = permission.as_str(),
                "权限不足"
            );
            Err(AuthError::InsufficientPermissions)
        }
    }
}

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or(ApiError::Authentication(AuthError::MissingToken))
    }
}

pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    expiration_hours: i64,
}

impl JwtService {
    pub fn new(secret: &str, expiration_hours: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_ref()),
            decoding_key: DecodingKey::from_secret(secret.as_ref()),
            expiration_hours,
        }
    }

    pub fn generate_token(
        &self,
        user_id: &str,
        permissions: &[Permission],
    ) -> Result<String, jsonwebtoken::errors::Error> {
        let now = Utc::now();
        let exp = now + Duration::hours(self.expiration_hours);

        let claims = Claims {
            sub: user_id.to_string(),
            exp: exp.timestamp(),
            iat: now.timestamp(),
            permissions: permissions.iter().map(|p| p.as_str().to_string()).collect(),
            user_id: Some(user_id.to_string()),
        };

        encode(&Header::default(), &claims, &self.encoding_key)
    }

    pub fn validate_token(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        let validation = Validation::new(Algorithm::HS256);
        let token_data = decode::<Claims>(token, &self.decoding_key, &validation)?;
        Ok(token_data.claims)
    }
}

#[derive(Debug, Clone)]
pub struct ApiKeyInfo {
    pub name: String,
    pub permissions: Vec<Permission>,
    pub is_active: bool,
}

/// API Key 校验，按 key 的 SHA-256 摘要查找
pub struct ApiKeyService {
    keys: HashMap<String, ApiKeyInfo>,
}

impl ApiKeyService {
    pub fn new(keys: HashMap<String, ApiKeyInfo>) -> Self {
        Self { keys }
    }

    pub fn validate_api_key(&self, api_key: &str) -> Result<&ApiKeyInfo, AuthError> {
        self.keys
            .get(&hash_api_key(api_key))
            .filter(|info| info.is_active)
            .ok_or(AuthError::InvalidApiKey)
    }

    pub fn generate_api_key() -> String {
        use rand::Rng;
        let mut rng = rand::rng();
        let key: [u8; 32] = rng.random();
        general_purpose::URL_SAFE_NO_PAD.encode(key)
    }
}

/// 配置文件中保存的 API Key 摘要：SHA-256 后 base64 编码
pub fn hash_api_key(api_key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(api_key.as_bytes());
    general_purpose::STANDARD.encode(hasher.finalize())
}

/// 运行期认证状态，由配置构建
pub struct AuthState {
    pub enabled: bool,
    pub jwt: JwtService,
    pub api_keys: ApiKeyService,
}

impl AuthState {
    pub fn from_config(config: &streetwise_config::AuthConfig) -> Self {
        let keys = config
            .api_keys
            .iter()
            .map(|key| {
                let permissions = key
                    .permissions
                    .iter()
                    .filter_map(|p| parse_permission(p))
                    .collect();
                (
                    key.key_hash.clone(),
                    ApiKeyInfo {
                        name: key.name.clone(),
                        permissions,
                        is_active: key.is_active,
                    },
                )
            })
            .collect();

        Self {
            enabled: config.enabled,
            jwt: JwtService::new(&config.jwt_secret, config.jwt_expiration_hours as i64),
            api_keys: ApiKeyService::new(keys),
        }
    }

    pub fn authenticate(&self, req: &Request) -> Result<AuthenticatedUser, AuthError> {
        if !self.enabled {
            return Ok(AuthenticatedUser {
                user_id: DEV_USER_ID.to_string(),
                permissions: vec![Permission::Admin],
                auth_type: AuthType::Disabled,
            });
        }

        if let Some(api_key) = extract_api_key(req) {
            let key_info = self.api_keys.validate_api_key(&api_key)?;
            return Ok(AuthenticatedUser {
                user_id: key_info.name.clone(),
                permissions: key_info.permissions.clone(),
                auth_type: AuthType::ApiKey(key_info.name.clone()),
            });
        }

        if let Some(token) = extract_jwt_token(req) {
            return self.validate_jwt_token(&token);
        }

        Err(AuthError::MissingToken)
    }

    fn validate_jwt_token(&self, token: &str) -> Result<AuthenticatedUser, AuthError> {
        let claims = self.jwt.validate_token(token).map_err(|err| {
            debug!("JWT validation failed: {}", err);
            match err.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::ExpiredToken,
                _ => AuthError::InvalidToken,
            }
        })?;

        let user_id = claims.effective_user_id();
        if user_id.trim().is_empty() {
            return Err(AuthError::InvalidToken);
        }

        let mut permissions: Vec<Permission> = claims
            .permissions
            .iter()
            .filter_map(|p| parse_permission(p))
            .collect();
        if permissions.is_empty() {
            permissions = Permission::DEFAULT_USER.to_vec();
        }

        Ok(AuthenticatedUser {
            user_id: user_id.to_string(),
            permissions,
            auth_type: AuthType::Jwt,
        })
    }
}

pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    match state.auth.authenticate(&req) {
        Ok(user) => {
            req.extensions_mut().insert(user);
            Ok(next.run(req).await)
        }
        Err(err) => {
            warn!("Authentication failed: {}", err);
            Err(err.into())
        }
    }
}

fn extract_api_key(req: &Request) -> Option<String> {
    req.headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

fn extract_jwt_token(req: &Request) -> Option<String> {
    req.headers()
        .typed_get::<Authorization<Bearer>>()
        .map(|auth| auth.token().to_string())
        .or_else(|| {
            req.headers()
                .get(AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.strip_prefix(BEARER_PREFIX))
                .map(|s| s.to_string())
        })
}
