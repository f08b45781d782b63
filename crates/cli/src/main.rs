//! Artfulfam CLI - migrations and broker maintenance.
//!
//! # Usage
//!
//! ```bash
//! # Create the broker token table and session tables
//! artfulfam-cli migrate broker
//!
//! # Create the storefront session table
//! artfulfam-cli migrate storefront
//!
//! # List shops the broker holds Admin tokens for
//! artfulfam-cli tokens list
//!
//! # Issue a signup token for manual testing
//! artfulfam-cli signup-token issue --shop artfulfam.myshopify.com --email a@b.com
//!
//! # Produce broker signature headers for a request body
//! artfulfam-cli broker sign --body '{"email":"a@b.com"}' --shop artfulfam.myshopify.com
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "artfulfam-cli")]
#[command(author, version, about = "Artfulfam operator tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate {
        #[command(subcommand)]
        target: MigrateTarget,
    },
    /// Inspect or remove stored Admin tokens
    Tokens {
        #[command(subcommand)]
        action: TokensAction,
    },
    /// Issue or inspect signup tokens
    SignupToken {
        #[command(subcommand)]
        action: SignupTokenAction,
    },
    /// Broker request helpers
    Broker {
        #[command(subcommand)]
        action: BrokerAction,
    },
}

#[derive(Subcommand)]
enum MigrateTarget {
    /// Session table for the storefront
    Storefront,
    /// Token and session tables for the broker
    Broker,
    /// Both databases
    All,
}

#[derive(Subcommand)]
enum TokensAction {
    /// List connected shops
    List,
    /// Forget a shop's token
    Delete {
        /// Shop domain, in any form Shopify shows it
        #[arg(short, long)]
        shop: String,
    },
}

#[derive(Subcommand)]
enum SignupTokenAction {
    /// Print a freshly signed token
    Issue {
        #[arg(short, long)]
        shop: String,

        #[arg(short, long)]
        email: String,

        /// Shopify customer GID
        #[arg(long)]
        customer_id: Option<String>,

        /// Let the token authorize a phone/SMS update
        #[arg(long)]
        allow_phone_capture: bool,

        /// Lifetime in seconds
        #[arg(long, default_value_t = artfulfam_core::crypto::signup_token::DEFAULT_TTL_SECONDS)]
        ttl: i64,
    },
    /// Verify a token and print its payload
    Verify {
        token: String,

        /// Reject tokens issued for another shop
        #[arg(short, long)]
        shop: Option<String>,
    },
}

#[derive(Subcommand)]
enum BrokerAction {
    /// Print the signature headers for a request body
    Sign {
        /// Exact JSON body that will be sent
        #[arg(short, long)]
        body: String,

        #[arg(short, long)]
        shop: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate { target } => match target {
            MigrateTarget::Storefront => commands::migrate::storefront().await?,
            MigrateTarget::Broker => commands::migrate::broker().await?,
            MigrateTarget::All => {
                commands::migrate::storefront().await?;
                commands::migrate::broker().await?;
            }
        },
        Commands::Tokens { action } => match action {
            TokensAction::List => commands::tokens::list().await?,
            TokensAction::Delete { shop } => commands::tokens::delete(&shop).await?,
        },
        Commands::SignupToken { action } => match action {
            SignupTokenAction::Issue {
                shop,
                email,
                customer_id,
                allow_phone_capture,
                ttl,
            } => commands::sign::issue_signup_token(
                &shop,
                &email,
                customer_id,
                allow_phone_capture,
                ttl,
            )?,
            SignupTokenAction::Verify { token, shop } => {
                commands::sign::verify_signup_token(&token, shop.as_deref())?;
            }
        },
        Commands::Broker { action } => match action {
            BrokerAction::Sign { body, shop } => {
                commands::sign::broker_headers(&body, shop.as_deref())?;
            }
        },
    }
    Ok(())
}
