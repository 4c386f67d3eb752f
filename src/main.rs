use anyhow::{Context, Result};
use std::env;

use shiptrack::db::{count_rows, SAMPLE_ADMIN_EMAIL, SAMPLE_CUSTOMER_EMAIL, SAMPLE_PASSWORD, SAMPLE_STAFF_EMAIL};
use shiptrack::{logging, seed_sample_data, Config, Database};

const TABLES: [&str; 10] = [
    "User",
    "Staff",
    "Customer",
    "ServiceType",
    "Location",
    "Package",
    "TrackingEvent",
    "BillingStatement",
    "StatementPackage",
    "Payment",
];

fn main() -> Result<()> {
    let config = Config::from_env()?;
    logging::init_logging(config.log_json);

    let args: Vec<String> = env::args().collect();

    match args.get(1).map(String::as_str) {
        Some("init") => run_init(&config),
        Some("status") => run_status(&config),
        _ => {
            eprintln!("Usage: shiptrack <init|status>");
            eprintln!("  init    create the schema and load sample data");
            eprintln!("  status  show row counts per table");
            eprintln!("\nRun the API with: shiptrack-server");
            std::process::exit(2);
        }
    }
}

fn run_init(config: &Config) -> Result<()> {
    println!("🗄️  shiptrack - Database Setup");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let db = Database::new(&config.db_path);

    println!("\n🔧 Creating schema...");
    db.init()
        .with_context(|| format!("failed to initialize {}", config.db_path.display()))?;
    println!("✓ Schema ready (WAL mode, foreign keys on)");

    println!("\n🌱 Loading sample data...");
    db.write(|tx| seed_sample_data(tx))?;
    println!("✓ Sample users, services and locations loaded");

    println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("Sample logins (password: {})", SAMPLE_PASSWORD);
    println!("  admin:    {}", SAMPLE_ADMIN_EMAIL);
    println!("  staff:    {}", SAMPLE_STAFF_EMAIL);
    println!("  customer: {}", SAMPLE_CUSTOMER_EMAIL);

    Ok(())
}

fn run_status(config: &Config) -> Result<()> {
    if !config.db_path.exists() {
        eprintln!("❌ Database not found at {:?}", config.db_path);
        eprintln!("   Run: shiptrack init");
        std::process::exit(1);
    }

    let db = Database::new(&config.db_path);
    println!("📊 {}", db.path().display());

    db.read(|conn| {
        for table in TABLES {
            println!("  {:<18} {:>6}", table, count_rows(conn, table)?);
        }
        Ok(())
    })?;

    Ok(())
}
