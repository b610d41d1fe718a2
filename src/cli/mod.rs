use anyhow::{Context, Result};
use chrono::{Duration, NaiveDate, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use uuid::Uuid;

use crate::application::{AppError, FinanceService, MonthlyIncomeReport};
use crate::domain::{
    IncomeUpdate, NewExpense, NewIncomeRecord, NewPayment, PaymentMethod, Session,
    DEFAULT_CURRENCY, format_amount, format_cents, paid_total, parse_amount,
};
use crate::storage::{AuthProvider, DEFAULT_SESSION_DAYS, SqliteAuthProvider, SqliteRecordStore};

/// vetledger - veterinary practice finances
#[derive(Parser)]
#[command(name = "vetledger")]
#[command(about = "Invoices, payments, expenses and outstanding debt for a veterinary practice")]
#[command(version)]
pub struct Cli {
    /// Database file path
    #[arg(short, long, env = "VETLEDGER_DB", default_value = "vetledger.db")]
    pub database: String,

    /// How long a sign-in stays valid, in days
    #[arg(long, env = "VETLEDGER_SESSION_DAYS", default_value_t = DEFAULT_SESSION_DAYS)]
    pub session_days: i64,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Clone, Copy, Debug, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new database
    Init,

    /// Sign up, sign in and out
    #[command(subcommand)]
    Auth(AuthCommands),

    #[command(flatten)]
    Ledger(LedgerCommands),
}

/// Commands that run against the signed-in user's records
#[derive(Subcommand)]
pub enum LedgerCommands {
    /// Invoice (income record) management
    #[command(subcommand)]
    Income(IncomeCommands),

    /// Apply a payment to an invoice
    Pay {
        /// Invoice ID
        invoice: String,

        /// Amount paid (e.g., "400" or "400.00")
        #[arg(short, long)]
        amount: String,

        /// Payment method: cash, check, bank-transfer, credit-card
        #[arg(short, long, default_value = "cash")]
        method: String,

        /// Payment date (YYYY-MM-DD, defaults to today)
        #[arg(long)]
        date: Option<String>,

        /// Check number (implies --method check)
        #[arg(long)]
        check_number: Option<String>,

        /// Check due date (YYYY-MM-DD)
        #[arg(long)]
        check_due_date: Option<String>,

        /// Bank transfer reference
        #[arg(long)]
        bank_reference: Option<String>,
    },

    /// List payments
    Payments {
        /// Only payments for this invoice
        #[arg(long)]
        invoice: Option<String>,
    },

    /// Re-derive an invoice's status from its payments
    Resync {
        /// Invoice ID
        invoice: String,
    },

    /// Expense management
    #[command(subcommand)]
    Expense(ExpenseCommands),

    /// Totals, profit, outstanding debt and spending per category
    Summary {
        /// Filter from date (YYYY-MM-DD)
        #[arg(long)]
        from_date: Option<String>,

        /// Filter to date (YYYY-MM-DD)
        #[arg(long)]
        to_date: Option<String>,

        #[arg(long, value_enum, default_value_t)]
        format: OutputFormat,
    },

    /// Reports
    #[command(subcommand)]
    Report(ReportCommands),
}

#[derive(Subcommand)]
pub enum AuthCommands {
    /// Register a new user and sign in
    Signup {
        email: String,

        #[arg(long, env = "VETLEDGER_PASSWORD")]
        password: String,
    },

    /// Sign in as an existing user
    Signin {
        email: String,

        #[arg(long, env = "VETLEDGER_PASSWORD")]
        password: String,
    },

    /// End the current session
    Signout,

    /// Show the signed-in user
    Whoami,
}

#[derive(Subcommand)]
pub enum IncomeCommands {
    /// Record a new invoice
    Add {
        /// Client ID
        #[arg(long)]
        client: String,

        /// Amount owed (e.g., "1000" or "1000.00")
        #[arg(short, long)]
        amount: String,

        /// Service description
        #[arg(short, long, default_value = "")]
        description: String,

        /// Invoice date (YYYY-MM-DD, defaults to today)
        #[arg(long)]
        date: Option<String>,

        #[arg(short, long, default_value = DEFAULT_CURRENCY)]
        currency: String,

        /// Visit the invoice was raised from
        #[arg(long)]
        visit: Option<String>,

        #[arg(short, long)]
        notes: Option<String>,
    },

    /// List invoices
    List {
        /// Filter from date (YYYY-MM-DD)
        #[arg(long)]
        from_date: Option<String>,

        /// Filter to date (YYYY-MM-DD)
        #[arg(long)]
        to_date: Option<String>,

        /// Only invoices not yet paid
        #[arg(long)]
        pending: bool,
    },

    /// Edit an invoice
    Update {
        /// Invoice ID
        id: String,

        #[arg(short, long)]
        amount: Option<String>,

        #[arg(short, long)]
        description: Option<String>,

        /// Invoice date (YYYY-MM-DD)
        #[arg(long)]
        date: Option<String>,

        /// New notes; pass "" to clear them
        #[arg(short, long)]
        notes: Option<String>,
    },

    /// Delete an invoice and its payments
    Delete {
        /// Invoice ID
        id: String,
    },
}

#[derive(Subcommand)]
pub enum ExpenseCommands {
    /// Record an expense
    Add {
        /// Category (e.g., "Medications", "Rent")
        #[arg(short, long)]
        category: String,

        /// Amount (e.g., "150" or "150.00")
        #[arg(short, long)]
        amount: String,

        #[arg(short, long, default_value = "")]
        description: String,

        /// Expense date (YYYY-MM-DD, defaults to today)
        #[arg(long)]
        date: Option<String>,

        #[arg(long)]
        supplier: Option<String>,

        #[arg(long)]
        invoice_number: Option<String>,

        /// How the expense was paid
        #[arg(short, long)]
        method: Option<String>,

        #[arg(long, default_value = DEFAULT_CURRENCY)]
        currency: String,

        #[arg(short, long)]
        notes: Option<String>,
    },

    /// List expenses
    List {
        /// Filter from date (YYYY-MM-DD)
        #[arg(long)]
        from_date: Option<String>,

        /// Filter to date (YYYY-MM-DD)
        #[arg(long)]
        to_date: Option<String>,
    },

    /// Delete an expense
    Delete {
        /// Expense ID
        id: String,
    },
}

#[derive(Subcommand)]
pub enum ReportCommands {
    /// Invoiced income per month
    Monthly {
        /// Number of months to show
        #[arg(short, long, default_value = "6")]
        months: u32,

        #[arg(long, value_enum, default_value_t)]
        format: OutputFormat,
    },
}

type Service = FinanceService<SqliteRecordStore>;

impl Cli {
    pub async fn run(self) -> Result<()> {
        let Cli {
            database,
            session_days,
            command,
            ..
        } = self;

        match command {
            Commands::Init => {
                FinanceService::init(&database).await?;
                println!("Database initialized: {}", database);
            }
            Commands::Auth(cmd) => {
                let (_, auth) = open(&database, session_days).await?;
                run_auth_command(&auth, cmd).await?;
            }
            Commands::Ledger(cmd) => {
                let (mut service, auth) = open(&database, session_days).await?;
                let session = auth.get_session().await?;
                run_ledger_command(&mut service, session.as_ref(), cmd).await?;
            }
        }
        Ok(())
    }
}

async fn open(database: &str, session_days: i64) -> Result<(Service, SqliteAuthProvider)> {
    let service = FinanceService::connect(database)
        .await
        .with_context(|| format!("Cannot open {}; run `vetledger init` first", database))?;
    let auth = SqliteAuthProvider::new(service.store().pool().clone())
        .with_session_ttl(Duration::days(session_days));
    Ok((service, auth))
}

async fn run_ledger_command(
    service: &mut Service,
    session: Option<&Session>,
    cmd: LedgerCommands,
) -> Result<()> {
    match cmd {
        LedgerCommands::Income(cmd) => run_income_command(service, session, cmd).await?,

        LedgerCommands::Pay {
            invoice,
            amount,
            method,
            date,
            check_number,
            check_due_date,
            bank_reference,
        } => {
            let invoice_id = parse_id(&invoice, "invoice")?;
            let amount_cents =
                parse_amount(&amount).context("Invalid amount format. Use '400.00' or '400'")?;
            let method = PaymentMethod::from_str(&method).with_context(|| {
                format!(
                    "Invalid payment method '{}'. Use cash, check, bank-transfer or credit-card",
                    method
                )
            })?;

            let mut payment = NewPayment::new(invoice_id, amount_cents, date_or_today(date)?)
                .with_method(method);
            if let Some(number) = check_number {
                let due = check_due_date
                    .map(|d| parse_date(&d))
                    .transpose()
                    .context("Invalid check due date")?;
                payment = payment.with_check(number, due);
            }
            if let Some(reference) = bank_reference {
                payment = payment.with_bank_reference(reference);
            }

            service.refresh(session, None, None).await?;
            match service.add_payment(session, payment).await {
                Ok(applied) => {
                    let paid = paid_total(applied.record.id, service.payments());
                    println!(
                        "Recorded payment: {} ({})",
                        format_amount(applied.payment.amount_paid_cents, &applied.record.currency),
                        applied.payment.id
                    );
                    println!(
                        "Invoice {} is now {} ({} of {} paid)",
                        applied.record.id,
                        applied.record.payment_status,
                        format_cents(paid),
                        format_cents(applied.record.amount_cents)
                    );
                }
                Err(err @ AppError::StatusUpdateFailed { .. }) => {
                    eprintln!("Warning: {}", err);
                    eprintln!("Run `vetledger resync {}` to repair the status.", invoice_id);
                    return Err(err.into());
                }
                Err(err) => return Err(err.into()),
            }
        }

        LedgerCommands::Payments { invoice } => {
            let invoice_id = invoice.map(|i| parse_id(&i, "invoice")).transpose()?;
            service.refresh(session, None, None).await?;
            let payments: Vec<_> = service
                .payments()
                .iter()
                .filter(|p| invoice_id.is_none_or(|id| p.income_record_id == id))
                .collect();

            if payments.is_empty() {
                println!("No payments found.");
            } else {
                println!(
                    "{:<12} {:>12} {:<14} {:<36} REFERENCE",
                    "DATE", "AMOUNT", "METHOD", "INVOICE"
                );
                println!("{}", "-".repeat(90));
                for p in payments {
                    let reference = p
                        .check_number
                        .as_deref()
                        .or(p.bank_reference.as_deref())
                        .unwrap_or("");
                    println!(
                        "{:<12} {:>12} {:<14} {:<36} {}",
                        p.payment_date,
                        format_cents(p.amount_paid_cents),
                        p.method,
                        p.income_record_id,
                        reference
                    );
                }
            }
        }

        LedgerCommands::Resync { invoice } => {
            let invoice_id = parse_id(&invoice, "invoice")?;
            service.refresh(session, None, None).await?;
            let before = service
                .find_income(invoice_id)
                .map(|r| r.payment_status);
            let record = service.resync_status(session, invoice_id).await?;
            match before {
                Some(status) if status != record.payment_status => println!(
                    "Invoice {}: {} -> {}",
                    record.id, status, record.payment_status
                ),
                _ => println!(
                    "Invoice {} unchanged: {}",
                    record.id, record.payment_status
                ),
            }
        }

        LedgerCommands::Expense(cmd) => run_expense_command(service, session, cmd).await?,

        LedgerCommands::Summary {
            from_date,
            to_date,
            format,
        } => {
            let (from, to) = parse_range(from_date, to_date)?;
            service.refresh(session, from, to).await?;
            let summary = service.summary();

            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
                OutputFormat::Text => {
                    println!("Financial Summary");
                    println!();
                    println!("Total Income:      {:>15}", format_cents(summary.total_income));
                    println!("Total Expenses:    {:>15}", format_cents(summary.total_expenses));
                    println!("{}", "-".repeat(35));
                    println!("Net Profit:        {:>15}", format_cents(summary.net_profit));
                    println!();
                    println!(
                        "Outstanding Debt:  {:>15}  ({} open invoices)",
                        format_cents(summary.outstanding_debt),
                        summary.pending_invoices
                    );

                    if !summary.expenses_by_category.is_empty() {
                        println!();
                        println!("Expenses by Category:");
                        for (category, total) in &summary.expenses_by_category {
                            println!("  {:<20} {:>12}", category, format_cents(*total));
                        }
                    }
                    if summary.currencies.len() > 1 {
                        println!();
                        println!(
                            "Note: totals mix currencies ({}) without conversion",
                            summary.currencies.join(", ")
                        );
                    }
                }
            }
        }

        LedgerCommands::Report(ReportCommands::Monthly { months, format }) => {
            service.refresh(session, None, None).await?;
            let report = service.monthly_income(Utc::now().date_naive(), months);
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
                OutputFormat::Text => print_monthly_report(&report),
            }
        }
    }

    Ok(())
}

async fn run_auth_command(auth: &SqliteAuthProvider, cmd: AuthCommands) -> Result<()> {
    match cmd {
        AuthCommands::Signup { email, password } => {
            let session = auth.sign_up(&email, &password).await?;
            println!("Registered and signed in as {}", session.email);
        }
        AuthCommands::Signin { email, password } => {
            let session = auth.sign_in(&email, &password).await?;
            println!(
                "Signed in as {} (until {})",
                session.email,
                session.expires_at.format("%Y-%m-%d %H:%M")
            );
        }
        AuthCommands::Signout => {
            auth.sign_out().await?;
            println!("Signed out");
        }
        AuthCommands::Whoami => match auth.get_session().await? {
            Some(session) => println!("{} ({})", session.email, session.user_id),
            None => println!("Not signed in"),
        },
    }
    Ok(())
}

async fn run_income_command(
    service: &mut Service,
    session: Option<&Session>,
    cmd: IncomeCommands,
) -> Result<()> {
    match cmd {
        IncomeCommands::Add {
            client,
            amount,
            description,
            date,
            currency,
            visit,
            notes,
        } => {
            let client_id = parse_id(&client, "client")?;
            let amount_cents =
                parse_amount(&amount).context("Invalid amount format. Use '1000.00' or '1000'")?;

            let mut record = NewIncomeRecord::new(client_id, amount_cents, date_or_today(date)?)
                .with_description(description)
                .with_currency(currency);
            if let Some(visit) = visit {
                record = record.with_visit(parse_id(&visit, "visit")?);
            }
            if let Some(notes) = notes {
                record = record.with_notes(notes);
            }

            let stored = service.add_income(session, record).await?;
            println!(
                "Recorded invoice: {} ({})",
                format_amount(stored.amount_cents, &stored.currency),
                stored.id
            );
        }

        IncomeCommands::List {
            from_date,
            to_date,
            pending,
        } => {
            let (from, to) = parse_range(from_date, to_date)?;
            service.refresh(session, from, to).await?;

            let records: Vec<_> = if pending {
                service.pending_income()
            } else {
                service.income().iter().collect()
            };

            if records.is_empty() {
                println!("No invoices found.");
            } else {
                println!(
                    "{:<12} {:>12} {:>12} {:<8} {:<36} DESCRIPTION",
                    "DATE", "AMOUNT", "PAID", "STATUS", "ID"
                );
                println!("{}", "-".repeat(100));
                for r in records {
                    println!(
                        "{:<12} {:>12} {:>12} {:<8} {:<36} {}",
                        r.income_date,
                        format_cents(r.amount_cents),
                        format_cents(paid_total(r.id, service.payments())),
                        r.payment_status,
                        r.id,
                        r.description
                    );
                }
            }
        }

        IncomeCommands::Update {
            id,
            amount,
            description,
            date,
            notes,
        } => {
            let id = parse_id(&id, "invoice")?;
            let update = IncomeUpdate {
                description,
                amount_cents: amount
                    .map(|a| parse_amount(&a))
                    .transpose()
                    .context("Invalid amount format")?,
                currency: None,
                income_date: date
                    .map(|d| parse_date(&d))
                    .transpose()
                    .context("Invalid date")?,
                notes,
            };

            service.refresh(session, None, None).await?;
            let updated = service.update_income(session, id, update).await?;
            println!(
                "Updated invoice {}: {} ({})",
                updated.id,
                format_amount(updated.amount_cents, &updated.currency),
                updated.payment_status
            );
        }

        IncomeCommands::Delete { id } => {
            let id = parse_id(&id, "invoice")?;
            service.delete_income(session, id).await?;
            println!("Deleted invoice {}", id);
        }
    }
    Ok(())
}

async fn run_expense_command(
    service: &mut Service,
    session: Option<&Session>,
    cmd: ExpenseCommands,
) -> Result<()> {
    match cmd {
        ExpenseCommands::Add {
            category,
            amount,
            description,
            date,
            supplier,
            invoice_number,
            method,
            currency,
            notes,
        } => {
            let amount_cents =
                parse_amount(&amount).context("Invalid amount format. Use '150.00' or '150'")?;

            let mut expense = NewExpense::new(category, amount_cents, date_or_today(date)?)
                .with_description(description)
                .with_currency(currency);
            if let Some(supplier) = supplier {
                expense = expense.with_supplier(supplier);
            }
            if let Some(number) = invoice_number {
                expense = expense.with_invoice_number(number);
            }
            if let Some(method) = method {
                expense = expense.with_payment_method(method);
            }
            if let Some(notes) = notes {
                expense = expense.with_notes(notes);
            }

            let stored = service.add_expense(session, expense).await?;
            println!(
                "Recorded expense: {} {} ({})",
                stored.category,
                format_amount(stored.amount_cents, &stored.currency),
                stored.id
            );
        }

        ExpenseCommands::List { from_date, to_date } => {
            let (from, to) = parse_range(from_date, to_date)?;
            service.refresh(session, from, to).await?;

            if service.expenses().is_empty() {
                println!("No expenses found.");
            } else {
                println!(
                    "{:<12} {:>12} {:<16} {:<20} {:<36}",
                    "DATE", "AMOUNT", "CATEGORY", "SUPPLIER", "ID"
                );
                println!("{}", "-".repeat(100));
                for e in service.expenses() {
                    println!(
                        "{:<12} {:>12} {:<16} {:<20} {:<36}",
                        e.expense_date,
                        format_cents(e.amount_cents),
                        e.category,
                        e.supplier.as_deref().unwrap_or(""),
                        e.id
                    );
                }
            }
        }

        ExpenseCommands::Delete { id } => {
            let id = parse_id(&id, "expense")?;
            service.delete_expense(session, id).await?;
            println!("Deleted expense {}", id);
        }
    }
    Ok(())
}

fn print_monthly_report(report: &MonthlyIncomeReport) {
    println!("Monthly Income (as of {})", report.as_of);
    println!();
    println!("{:<10} {:>15} {:>8}", "MONTH", "INCOME", "COUNT");
    println!("{}", "-".repeat(35));
    for bucket in &report.months {
        println!(
            "{:<10} {:>15} {:>8}",
            bucket.label(),
            format_cents(bucket.total),
            bucket.count
        );
    }
    println!("{}", "-".repeat(35));
    println!("This month:  {:>15}", format_cents(report.this_month));
    println!("Last month:  {:>15}", format_cents(report.last_month));
    println!("Change:      {:>14.1}%", report.change_percent);
    println!("All time:    {:>15}", format_cents(report.all_time));
}

fn parse_id(value: &str, what: &str) -> Result<Uuid> {
    Uuid::parse_str(value.trim())
        .with_context(|| format!("Invalid {} ID '{}' (expected UUID)", what, value))
}

fn parse_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .with_context(|| format!("Invalid date format '{}'. Use YYYY-MM-DD", value))
}

fn date_or_today(value: Option<String>) -> Result<NaiveDate> {
    match value {
        Some(date) => parse_date(&date),
        None => Ok(Utc::now().date_naive()),
    }
}

fn parse_range(
    from: Option<String>,
    to: Option<String>,
) -> Result<(Option<NaiveDate>, Option<NaiveDate>)> {
    let from = from
        .map(|d| parse_date(&d))
        .transpose()
        .context("Invalid from-date")?;
    let to = to
        .map(|d| parse_date(&d))
        .transpose()
        .context("Invalid to-date")?;
    Ok((from, to))
}
