#[macro_use]
mod macros;

mod actions;
mod auth;
mod billing;
mod config;
mod constants;
mod error;
mod handlers;
mod pending;
mod providers;
mod server;
mod utils;
mod views;

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    if let Err(err) = server::run().await {
        eprintln!("Error: {:?}", err);
        std::process::exit(1);
    }
}
