//! Console login demo.
//!
//! Requests a login code, prints it to the terminal in place of an email,
//! reads it back from stdin and prints the resulting session.
//!
//! Configuration comes from `AGROGATE_*` variables (a `.env` file is
//! honoured). With `AGROGATE_REDIS_URL` set, codes and rate limits live in
//! `Redis`; otherwise in memory.
//!
//! Run with: cargo run -p agrogate-auth --example console_login -- grower@example.com

use agrogate_auth::{
    AuthConfig, AuthService, Completion, InMemoryRevocationList, Purpose, SubmitOutcome,
    config::SessionConfig,
    mocks::{MockAccountDirectory, MockRateLimiter, MockVerificationStore},
    providers::{ConsoleDispatcher, RateLimiter, VerificationStore},
    stores::{RedisRateLimiter, RedisVerificationStore},
};
use agrogate_core::environment::SystemClock;
use secrecy::SecretString;
use std::io::BufRead;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "agrogate_auth=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let subject = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "grower@example.com".to_string());

    let mut config = AuthConfig::from_env()?;
    if config.session.signing_key.is_none() {
        tracing::warn!("AGROGATE_SESSION_SIGNING_KEY unset; using a throwaway demo key");
        config = config.with_session(SessionConfig::new(SecretString::from(
            "demo-only-signing-key-do-not-deploy-0000",
        )));
    }

    match config.redis_url.clone() {
        Some(url) => {
            let store = RedisVerificationStore::new(&url).await?;
            let limiter = RedisRateLimiter::new(&url).await?;
            run(&config, &subject, store, limiter).await
        },
        None => run(&config, &subject, MockVerificationStore::new(), MockRateLimiter::new()).await,
    }
}

async fn run<S, L>(
    config: &AuthConfig,
    subject: &str,
    store: S,
    limiter: L,
) -> Result<(), Box<dyn std::error::Error>>
where
    S: VerificationStore + Clone + 'static,
    L: RateLimiter + Clone + 'static,
{
    let service = Arc::new(AuthService::from_config(
        config,
        Arc::new(SystemClock),
        store,
        ConsoleDispatcher::new(),
        MockAccountDirectory::new(),
        limiter,
        InMemoryRevocationList::new(),
    )?);
    let sweeper = service.spawn_sweeper(std::time::Duration::from_secs(60));

    println!("=== Agrogate console login ===\n");
    println!(">>> Requesting a login code for {subject}");
    let outcome = service.request_code(subject, Purpose::Login).await?;
    println!("{outcome:?}\n");

    println!("Enter the code:");
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;

    match service.submit_code(subject, &line, Completion::Login).await? {
        SubmitOutcome::Authenticated(issued) => {
            println!("\nSigned in as {} ({:?})", issued.session.subject, issued.session.role);
            println!("Session expires at {}", issued.session.expires_at);
            println!("Token: {}", issued.token.expose());

            let session = service.verify_session(issued.token.expose()).await?;
            println!("Token verifies for {}", session.subject);
        },
        other => println!("\nNot signed in: {other:?}"),
    }

    sweeper.abort();
    Ok(())
}
