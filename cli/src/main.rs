use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use paydesk::api::invoices::{Invoice, LineItem, NewInvoice};
use paydesk::api::products::NewProduct;
use paydesk::api::withdrawals::WithdrawalRequest;
use paydesk::api::{auth, banks, invoices, products, wallet, withdrawals};
use paydesk::{
    ApiClient, ApiError, ClientConfig, Credentials, FileStore, SessionEvent, SessionManager, SessionState,
    SessionStore,
};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("missing password; pass --password or set PAYDESK_PASSWORD")]
    MissingPassword,
    #[error("missing PIN; pass --pin or set PAYDESK_PIN")]
    MissingPin,
    #[error("not logged in; run `paydesk login` first")]
    NotLoggedIn,
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

#[derive(Parser, Debug)]
#[command(name = "paydesk", about = "Paydesk merchant API CLI")]
struct Cli {
    /// Overrides `PAYDESK_BASE_URL` from the client configuration.
    #[arg(long)]
    base_url: Option<String>,

    #[arg(long, env = "PAYDESK_SESSION_FILE", default_value = "./.paydesk/session.json")]
    session_file: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Signup(SignupArgs),
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "PAYDESK_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
    Logout,
    /// Restore the persisted session and print who is logged in.
    Whoami,
    /// Keep the session alive and print session events until Ctrl-C.
    Watch,
    Balance,
    Transactions {
        #[arg(long, default_value_t = 1)]
        page: u32,
    },
    Banks,
    Resolve {
        bank_code: String,
        account_number: String,
    },
    Invoice(InvoiceCommand),
    Product(ProductCommand),
    Withdraw(WithdrawArgs),
}

#[derive(Args, Debug)]
struct SignupArgs {
    #[arg(long)]
    first_name: String,
    #[arg(long)]
    last_name: String,
    #[arg(long)]
    email: String,
    #[arg(long, env = "PAYDESK_PASSWORD", hide_env_values = true)]
    password: Option<String>,
    #[arg(long)]
    phone: Option<String>,
    #[arg(long)]
    business_name: Option<String>,
}

#[derive(Args, Debug)]
struct InvoiceCommand {
    #[command(subcommand)]
    command: InvoiceSubcommand,
}

#[derive(Subcommand, Debug)]
enum InvoiceSubcommand {
    List,
    Get {
        id: String,
    },
    Create {
        #[arg(long)]
        customer_name: String,
        #[arg(long)]
        customer_email: String,
        #[arg(long, help = "YYYY-MM-DD")]
        due_date: String,
        #[arg(long = "item", required = true, value_parser = parse_line_item, help = "description:quantity:unit_price")]
        items: Vec<LineItem>,
        #[arg(long)]
        note: Option<String>,
    },
}

#[derive(Args, Debug)]
struct ProductCommand {
    #[command(subcommand)]
    command: ProductSubcommand,
}

#[derive(Subcommand, Debug)]
enum ProductSubcommand {
    List,
    Create {
        #[arg(long)]
        name: String,
        #[arg(long)]
        price: i64,
        #[arg(long)]
        description: Option<String>,
    },
}

#[derive(Args, Debug)]
struct WithdrawArgs {
    #[arg(long)]
    amount: i64,
    #[arg(long)]
    bank_code: String,
    #[arg(long)]
    account_number: String,
    #[arg(long, env = "PAYDESK_PIN", hide_env_values = true)]
    pin: Option<String>,
    #[arg(long)]
    narration: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let cli = Cli::parse();
    let mut config = ClientConfig::from_env()?;
    if let Some(base_url) = cli.base_url {
        config.base_url = base_url.trim_end_matches('/').to_owned();
    }
    let store: Arc<dyn SessionStore> = Arc::new(FileStore::new(cli.session_file));
    let client = Arc::new(ApiClient::from_config(config, store)?);
    let session = SessionManager::new(Arc::clone(&client));

    match cli.command {
        Command::Signup(args) => run_signup(&client, args).await,
        Command::Login { email, password } => run_login(&session, email, password).await,
        Command::Logout => {
            session.logout().await;
            println!("logged out");
            Ok(())
        }
        Command::Whoami => run_whoami(&session).await,
        Command::Watch => run_watch(&session).await,
        Command::Balance => {
            require_session(&session)?;
            let balance = wallet::balance(&client).await?;
            println!("{} {}", format_minor(balance.balance), balance.currency);
            Ok(())
        }
        Command::Transactions { page } => run_transactions(&client, &session, page).await,
        Command::Banks => {
            for bank in banks::list_banks(&client).await? {
                println!("{:<8} {}", bank.code, bank.name);
            }
            Ok(())
        }
        Command::Resolve { bank_code, account_number } => {
            let resolved = banks::resolve_account(&client, &bank_code, &account_number).await?;
            println!("{} {}", resolved.account_number, resolved.account_name);
            Ok(())
        }
        Command::Invoice(invoice) => run_invoice(&client, &session, invoice).await,
        Command::Product(product) => run_product(&client, &session, product).await,
        Command::Withdraw(args) => run_withdraw(&client, &session, args).await,
    }
}

async fn run_signup(client: &ApiClient, args: SignupArgs) -> Result<(), CliError> {
    let signup = auth::Signup {
        first_name: args.first_name,
        last_name: args.last_name,
        email: args.email,
        password: args.password.ok_or(CliError::MissingPassword)?,
        phone: args.phone,
        business_name: args.business_name,
    };
    let user = auth::signup(client, &signup).await?;
    println!("created {} <{}>; run `paydesk login` to continue", user.display_name(), user.email);
    Ok(())
}

async fn run_login(session: &SessionManager, email: String, password: Option<String>) -> Result<(), CliError> {
    let password = password.ok_or(CliError::MissingPassword)?;
    let snapshot = session.login(&Credentials::new(email, password)).await?;
    println!("logged in as {} <{}>", snapshot.user.display_name(), snapshot.user.email);
    Ok(())
}

async fn run_whoami(session: &SessionManager) -> Result<(), CliError> {
    let state = session.bootstrap().await?;
    print_state(&state);
    Ok(())
}

async fn run_watch(session: &SessionManager) -> Result<(), CliError> {
    let mut events = session.context().subscribe();
    match session.bootstrap().await {
        Ok(state) => print_state(&state),
        Err(error) => tracing::warn!(%error, "bootstrap failed; will retry on the next refresh"),
    }
    if matches!(session.state(), SessionState::LoggedOut) {
        return Err(CliError::NotLoggedIn);
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(SessionEvent::Refreshed) => print_state(&session.state()),
                Ok(SessionEvent::NavigateToLogin) => {}
                Ok(event @ (SessionEvent::SessionExpired | SessionEvent::LoggedOut)) => {
                    println!("{event:?}");
                    break;
                }
                Ok(event) => println!("{event:?}"),
                Err(RecvError::Lagged(skipped)) => tracing::warn!(skipped, "session events dropped"),
                Err(RecvError::Closed) => break,
            },
        }
    }
    Ok(())
}

async fn run_transactions(client: &ApiClient, session: &SessionManager, page: u32) -> Result<(), CliError> {
    require_session(session)?;
    let history = wallet::transactions(client, page).await?;
    for tx in &history.transactions {
        println!(
            "{}  {:<12} {:>14}  {:<10} {}",
            tx.created_at,
            tx.reference,
            format_minor(tx.amount),
            tx.status,
            tx.narration.as_deref().unwrap_or("")
        );
    }
    if history.has_more() {
        println!("-- page {} of {}; use --page {} for more", history.page, history.total_pages, history.page + 1);
    }
    Ok(())
}

async fn run_invoice(client: &ApiClient, session: &SessionManager, invoice: InvoiceCommand) -> Result<(), CliError> {
    require_session(session)?;
    match invoice.command {
        InvoiceSubcommand::List => {
            for invoice in invoices::list_invoices(client).await? {
                print_invoice(&invoice);
            }
        }
        InvoiceSubcommand::Get { id } => {
            let invoice = invoices::get_invoice(client, &id).await?;
            print_invoice(&invoice);
            if let Some(link) = &invoice.payment_link {
                println!("  pay: {link}");
            }
        }
        InvoiceSubcommand::Create { customer_name, customer_email, due_date, items, note } => {
            let draft = NewInvoice { customer_name, customer_email, due_date, items, note };
            let invoice = invoices::create_invoice(client, &draft).await?;
            print_invoice(&invoice);
        }
    }
    Ok(())
}

async fn run_product(client: &ApiClient, session: &SessionManager, product: ProductCommand) -> Result<(), CliError> {
    require_session(session)?;
    match product.command {
        ProductSubcommand::List => {
            for product in products::list_products(client).await? {
                println!("{}  {:<24} {:>12} {}", product.id, product.name, format_minor(product.price), product.currency);
            }
        }
        ProductSubcommand::Create { name, price, description } => {
            let product = products::create_product(client, &NewProduct { name, price, description }).await?;
            println!("created {} ({})", product.name, product.id);
        }
    }
    Ok(())
}

async fn run_withdraw(client: &ApiClient, session: &SessionManager, args: WithdrawArgs) -> Result<(), CliError> {
    require_session(session)?;
    let request = WithdrawalRequest {
        amount: args.amount,
        bank_code: args.bank_code,
        account_number: args.account_number,
        pin: args.pin.ok_or(CliError::MissingPin)?,
        narration: args.narration,
    };
    withdrawals::validate_pin(client, &request.pin).await?;
    let withdrawal = withdrawals::withdraw(client, &request).await?;
    println!("{} {} {}", withdrawal.reference, withdrawal.status, format_minor(withdrawal.amount));
    Ok(())
}

fn require_session(session: &SessionManager) -> Result<(), CliError> {
    match session.context().session_token() {
        Ok(Some(_)) => Ok(()),
        Ok(None) => Err(CliError::NotLoggedIn),
        Err(error) => Err(ApiError::from(error).into()),
    }
}

fn print_state(state: &SessionState) {
    match state.snapshot() {
        Some(snapshot) => {
            let marker = if matches!(state, SessionState::OptimisticallyLoggedIn(_)) { " (cached)" } else { "" };
            println!("{} <{}>{marker}", snapshot.user.display_name(), snapshot.user.email);
            if let Some(account) = &snapshot.account {
                println!("  balance: {} {}", format_minor(account.balance), account.currency);
            }
        }
        None => println!("{}", state.label()),
    }
}

fn print_invoice(invoice: &Invoice) {
    println!(
        "{}  {:<24} {:>14}  {:?}  due {}",
        invoice.invoice_number,
        invoice.customer_name,
        format_minor(invoice.total),
        invoice.status,
        invoice.due_date
    );
}

fn format_minor(amount: i64) -> String {
    let sign = if amount < 0 { "-" } else { "" };
    let abs = amount.unsigned_abs();
    format!("{sign}{}.{:02}", abs / 100, abs % 100)
}

fn parse_line_item(raw: &str) -> Result<LineItem, String> {
    let mut parts = raw.rsplitn(3, ':');
    let (Some(price), Some(quantity), Some(description)) = (parts.next(), parts.next(), parts.next()) else {
        return Err("expected description:quantity:unit_price".to_owned());
    };
    let quantity = quantity.parse::<u32>().map_err(|e| format!("invalid quantity `{quantity}`: {e}"))?;
    let unit_price = price.parse::<i64>().map_err(|e| format!("invalid unit price `{price}`: {e}"))?;
    Ok(LineItem { description: description.to_owned(), quantity, unit_price })
}

#[cfg(test)]
#[path = "main_test.rs"]
mod tests;
