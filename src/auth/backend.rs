//! Authentication backend trait and impl macro.

use crate::jwt::JwtConfig;

/// Trait for router state types that expose the token codec, so the
/// authentication extractor works against any of them.
pub trait HasAuthBackend {
    fn jwt(&self) -> &JwtConfig;
}

/// Implement `HasAuthBackend` for a state struct with a `jwt: Arc<JwtConfig>`
/// field.
#[macro_export]
macro_rules! impl_has_auth_backend {
    ($state_type:ty) => {
        impl $crate::auth::HasAuthBackend for $state_type {
            fn jwt(&self) -> &$crate::jwt::JwtConfig {
                &self.jwt
            }
        }
    };
}
