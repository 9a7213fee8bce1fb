use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use server_api::{
    auth::{mint_token, AuthConfig},
    AuthContext,
};
use shared::domain::{AddressId, NewAddress, Role, UserId};
use storage::{AddressFilter, AddressStore, SqliteStore};

#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, default_value = "sqlite://./data/addresses.db")]
    database_url: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    List {
        #[arg(long)]
        owner_id: Option<String>,
    },
    CreateAddress {
        owner_id: String,
        street: String,
        number: String,
        neighborhood: String,
        city: String,
        state: String,
        zip_code: String,
        #[arg(long)]
        complement: Option<String>,
        #[arg(long)]
        country: Option<String>,
    },
    SetPrimary {
        owner_id: String,
        address_id: String,
    },
    DeleteAddress {
        address_id: String,
    },
    /// Mints a bearer token for local testing against the server.
    IssueToken {
        user_id: String,
        #[arg(long, default_value = "customer")]
        role: String,
        #[arg(long, default_value = "devsecret")]
        secret: String,
        #[arg(long, default_value_t = 3600)]
        ttl_seconds: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::List { owner_id } => {
            let store = SqliteStore::new(&cli.database_url).await?;
            let filter = owner_id.map(|owner| AddressFilter::by_owner(UserId(owner)));
            let addresses = store.find_all(filter).await?;
            println!("{}", serde_json::to_string_pretty(&addresses)?);
        }
        Command::CreateAddress {
            owner_id,
            street,
            number,
            neighborhood,
            city,
            state,
            zip_code,
            complement,
            country,
        } => {
            let store = SqliteStore::new(&cli.database_url).await?;
            let address = store
                .create(NewAddress {
                    owner_id: UserId(owner_id),
                    street,
                    number,
                    complement,
                    neighborhood,
                    city,
                    state,
                    zip_code,
                    country,
                })
                .await?;
            println!("created address_id={}", address.id);
        }
        Command::SetPrimary {
            owner_id,
            address_id,
        } => {
            let store = SqliteStore::new(&cli.database_url).await?;
            let address_id: AddressId = address_id.parse()?;
            if !store.set_primary(&UserId(owner_id), address_id).await? {
                bail!("address {address_id} does not belong to that owner");
            }
            println!("primary address_id={address_id}");
        }
        Command::DeleteAddress { address_id } => {
            let store = SqliteStore::new(&cli.database_url).await?;
            let address_id: AddressId = address_id.parse()?;
            if !store.destroy(address_id).await? {
                bail!("address {address_id} not found");
            }
            println!("deleted address_id={address_id}");
        }
        Command::IssueToken {
            user_id,
            role,
            secret,
            ttl_seconds,
        } => {
            let role = if role.eq_ignore_ascii_case("admin") {
                Role::Admin
            } else {
                Role::Customer
            };
            let cfg = AuthConfig {
                jwt_secret: secret,
                ttl_seconds,
            };
            let caller = AuthContext {
                user_id: UserId(user_id),
                role,
            };
            println!("{}", mint_token(&cfg, &caller)?);
        }
    }

    Ok(())
}
