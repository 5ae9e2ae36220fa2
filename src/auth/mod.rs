mod middleware;
mod passkey;
mod password;
mod service;
mod session;
mod token;
mod webauthn;

pub use middleware::{AuthError, RequireAdmin, RequireUser};
pub use passkey::{
    AssertionResponse, AttestationResponse, ChallengeCeremony, CreationOptions, RequestOptions,
    SignupIdentity, new_challenge,
};
pub use password::{MIN_PASSWORD_LEN, PasswordManager};
pub use service::{AuthService, FederatedIdentity, Session};
pub use session::{CeremonyKind, MokaSessionStore, PendingCeremony, SessionStore};
pub use token::{AccessClaims, RefreshClaims, TokenPair, TokenService, TokenType};
pub use webauthn::{ALG_EDDSA, ALG_ES256, decode_b64, encode_b64};
