//! Twitter/X integration: OAuth1 signing, the authorization handshake,
//! credential persistence and the publishing client.

pub mod client;
pub mod credentials;
pub mod handshake;
pub mod oauth;

pub use client::{PostedTweet, TweetPublisher, TwitterClient, UnconfiguredPublisher, OOB_CALLBACK};
pub use credentials::{AccessToken, CredentialStore, RequestToken};
pub use handshake::{AuthFailure, CallbackParams, HandshakeState, OAuthHandshake};
pub use oauth::{ConsumerCredentials, OAuthRequest, OAuthSigner, TokenCredentials};
