//! Book rental demo.
//!
//! Seeds an in-memory library, walks one member through a rent, extend and
//! return, then leaves the overdue sweeper running until Ctrl-C.

use bookrental::{
    Config, Credential, LendingDesk, LendingEnvironment, OverdueSweeper, Repositories, Role,
};
use bookrental_core::environment::{RandomIds, SystemClock};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();

    let config = Config::from_env();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "bookrental={level},bookrental_runtime=debug",
                    level = config.log_level
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    config.validate()?;
    info!(
        loan_period_days = config.policy.loan_period_days,
        extension_days = config.policy.extension_days,
        user_borrow_limit = config.policy.user_borrow_limit,
        max_extensions = ?config.policy.max_extensions,
        sweep_interval_secs = config.sweeper.interval_secs,
        "Configuration loaded"
    );

    let environment = LendingEnvironment::new(
        Arc::new(SystemClock),
        Arc::new(RandomIds),
        Repositories::in_memory(),
        config.policy.clone(),
    );
    let desk = LendingDesk::open(environment).await?;

    // Seed data
    let admin = desk
        .register_member(
            "Library Admin",
            "admin@library.example",
            Credential::new("$argon2id$demo-admin"),
            Role::Admin,
        )
        .await?;
    let reader = desk
        .register_member(
            "Ada Reader",
            "ada@library.example",
            Credential::new("$argon2id$demo-user"),
            Role::User,
        )
        .await?;
    let dune = desk
        .register_book("978-0441013593", "Dune", "Frank Herbert", 2)
        .await?;
    desk.register_book("978-0141439587", "Emma", "Jane Austen", 1)
        .await?;
    desk.register_book("978-0547928227", "The Hobbit", "J.R.R. Tolkien", 3)
        .await?;
    let books = desk.list_books().await;
    info!(
        admin = %admin.id,
        reader = %reader.id,
        books = books.len(),
        "Library seeded"
    );

    // Scripted session
    let rental = desk.rent(dune.id, reader.id).await?;
    info!(rental_id = %rental.id, due_at = %rental.due_at, "Ada borrowed Dune");

    let rental = desk.extend_rental(rental.id).await?;
    info!(due_at = %rental.due_at, "Ada extended the loan");

    for book in desk.search_books("tolkien").await {
        match desk.rent(book.id, reader.id).await {
            Ok(rental) => info!(rental_id = %rental.id, title = %book.title, "Ada borrowed"),
            Err(error) => warn!(%error, title = %book.title, "Rent refused"),
        }
    }

    let rental = desk.return_book(rental.id).await?;
    info!(returned_at = ?rental.returned_at, "Ada returned Dune");

    if let Err(error) = desk.return_book(rental.id).await {
        info!(%error, kind = ?error.kind(), "Second return refused as expected");
    }

    let history = desk.rentals_by_member(reader.id).await?;
    let suspended = desk.is_suspended(reader.id).await?;
    info!(rentals = history.len(), suspended, "Ada's history");

    // Background sweep until Ctrl-C
    let sweeper = config
        .sweeper
        .interval()
        .map(|interval| OverdueSweeper::spawn(desk.clone(), interval));
    if sweeper.is_none() {
        info!("Overdue sweeper disabled");
    }

    info!("Press Ctrl-C to stop");
    signal::ctrl_c().await?;
    info!("Shutdown signal received");

    if let Some(sweeper) = sweeper {
        sweeper.stop().await;
    }
    desk.shutdown(Duration::from_secs(5)).await?;

    info!("Shutdown complete");
    Ok(())
}
