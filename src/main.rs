use std::{
    fs,
    io::{self, Write},
    path::PathBuf,
    process::ExitCode,
};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use ed25519_dalek::SigningKey;
use rand::{rngs::OsRng, RngCore};
use tracing_subscriber::EnvFilter;

use business_card::{
    amount::{format_ether, parse_ether},
    card::{CardRequest, CardType},
    config::{LedgerConfig, PricingConfig},
    ledger::{CallOutcome, Ledger, LedgerCall, LedgerId},
    permit::{parse_signing_key, Permit},
    store::StateFile,
    Address, Amount, LedgerError,
};

//==================== command line ====================//

#[derive(Parser)]
#[command(name = "business-card", version, about = "Business card ledger host")]
struct Cli {
    /// Ledger state file.
    #[arg(long, global = true, default_value = "ledger.json")]
    state: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// One-time bootstrap with the price constants.
    Init {
        #[arg(long)]
        from: Address,
        /// TOML file with [pricing] and [grants] tables.
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long, value_parser = ether)]
        first_mint_price: Option<Amount>,
        #[arg(long, value_parser = ether)]
        mint_price: Option<Amount>,
        #[arg(long, value_parser = ether)]
        stake_price: Option<Amount>,
        /// Fixed ledger id (64 hex chars); random when omitted.
        #[arg(long)]
        ledger_id: Option<LedgerId>,
    },
    /// Buy minting authority, optionally for another account.
    Mint {
        #[arg(long)]
        from: Address,
        #[arg(long, value_parser = ether)]
        payment: Amount,
        #[arg(long)]
        beneficiary: Option<Address>,
    },
    /// Spend one authority credit on a card.
    CreateCard(CreateCardArgs),
    /// Post collateral.
    Stake {
        #[arg(long)]
        from: Address,
        #[arg(long, value_parser = ether)]
        payment: Amount,
    },
    /// Generate an ed25519 keypair and print the derived address.
    Keygen {
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },
    /// Sign a delegation permit as the grantor.
    PermitSign {
        #[arg(long)]
        sk_hex: String,
        #[arg(long)]
        holder: Address,
        /// Defaults to the grantor's next nonce in the state file.
        #[arg(long)]
        nonce: Option<u64>,
        /// Defaults to the id of the ledger in the state file.
        #[arg(long)]
        ledger_id: Option<LedgerId>,
    },
    /// Submit a permit and pay for it as relayer.
    PermitRelay {
        #[arg(long)]
        from: Address,
        #[arg(long, value_parser = ether)]
        payment: Amount,
        #[arg(long)]
        token: String,
    },
    #[command(subcommand)]
    Query(Query),
    /// Print the event log as JSON lines.
    Events,
    /// Print height and state root.
    Snapshot,
}

#[derive(Args)]
struct CreateCardArgs {
    #[arg(long)]
    from: Address,
    #[arg(long)]
    name: String,
    #[arg(long)]
    email: String,
    #[arg(long)]
    phone: String,
    #[arg(long)]
    recipient: Address,
    #[arg(long, value_parser = ether)]
    value: Amount,
    /// Spend authority delegated by this account.
    #[arg(long)]
    grantor: Option<Address>,
}

#[derive(Subcommand)]
enum Query {
    Prices,
    FirstMinted { account: Address },
    Authorities { grantor: Address, holder: Address },
    Card { owner: Address, index: usize },
    Cards { owner: Address },
    Stake { account: Address },
    Nonce { grantor: Address },
    LedgerId,
}

fn ether(s: &str) -> Result<Amount, String> {
    parse_ether(s).map_err(|e| e.to_string())
}

//==================== commands ====================//

fn init_cmd(
    store: &StateFile,
    from: Address,
    config: Option<PathBuf>,
    overrides: [Option<Amount>; 3],
    ledger_id: Option<LedgerId>,
) -> Result<()> {
    let file_config = match config {
        Some(path) => LedgerConfig::load(&path)?,
        None => LedgerConfig::default(),
    };
    let [first, mint, stake] = overrides;
    let pricing = PricingConfig::new(
        first.unwrap_or(file_config.pricing.first_mint_price),
        mint.unwrap_or(file_config.pricing.mint_price),
        stake.unwrap_or(file_config.pricing.stake_price),
    );

    let mut ledger = store.load()?;
    if ledger.height() == 0 && *ledger.grants() != file_config.grants {
        ledger = Ledger::with_grants(file_config.grants)?;
    }
    match ledger_id {
        Some(id) => ledger.initialize_with_id(&from, pricing, id)?,
        None => ledger.initialize(&from, pricing)?,
    }
    store.save(&ledger)?;
    println!(
        "Initialized {} → {} (first mint {}, mint {}, stake {})",
        ledger.ledger_id(),
        store.path().display(),
        format_ether(pricing.first_mint_price),
        format_ether(pricing.mint_price),
        format_ether(pricing.stake_price)
    );
    Ok(())
}

fn execute_cmd(store: &StateFile, caller: Address, call: LedgerCall) -> Result<()> {
    let mut ledger = store.load()?;
    let outcome = ledger.execute(&caller, call)?;
    store.save(&ledger)?;
    match outcome {
        CallOutcome::Minted(r) => println!(
            "Granted {} credit(s) {} → {} (balance {}{})",
            r.credits,
            r.grantor,
            r.holder,
            r.balance,
            if r.first_mint { ", first mint" } else { "" }
        ),
        CallOutcome::CardCreated(r) => println!(
            "Card #{} for {} ({}), {} credit(s) left",
            r.index,
            r.owner,
            describe_card_type(&r.card_type),
            r.remaining
        ),
        CallOutcome::Staked { total } => println!("Stake balance {}", format_ether(total)),
    }
    Ok(())
}

fn keygen_cmd(out_dir: Option<PathBuf>) -> Result<()> {
    let mut sk_bytes = [0u8; 32];
    OsRng.fill_bytes(&mut sk_bytes);
    let sk = SigningKey::from_bytes(&sk_bytes);
    let pk = sk.verifying_key();
    let address = Address::from_verifying_key(&pk);

    match out_dir {
        Some(dir) => {
            fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;
            fs::write(dir.join("sk.hex"), hex::encode(sk_bytes))?;
            fs::write(dir.join("pk.hex"), hex::encode(pk.as_bytes()))?;
            fs::write(dir.join("address"), address.to_string())?;
            println!("keypair for {} written → {}", address, dir.display());
        }
        None => {
            println!("address {}", address);
            println!("sk-hex  {}", hex::encode(sk_bytes));
            println!("pk-hex  {}", hex::encode(pk.as_bytes()));
        }
    }
    Ok(())
}

fn permit_sign_cmd(
    store: &StateFile,
    sk_hex: &str,
    holder: Address,
    nonce: Option<u64>,
    ledger_id: Option<LedgerId>,
) -> Result<()> {
    let sk = parse_signing_key(sk_hex)?;
    let grantor = Address::from_verifying_key(&sk.verifying_key());
    let (ledger_id, nonce) = match (ledger_id, nonce) {
        (Some(id), Some(n)) => (id, n),
        (id, n) => {
            let ledger = store.load()?;
            if id.is_none() && !ledger.is_initialized() {
                return Err(LedgerError::NotInitialized).context("no ledger id to sign for");
            }
            (
                id.unwrap_or_else(|| ledger.ledger_id()),
                n.unwrap_or_else(|| ledger.permit_nonce(&grantor)),
            )
        }
    };
    let permit = Permit::sign(&sk, ledger_id, holder, nonce);
    eprintln!("permit {} → {} (nonce {}, ledger {})", grantor, holder, nonce, ledger_id);
    println!("{}", permit.to_token());
    Ok(())
}

fn query_cmd(ledger: &Ledger, query: Query, out: &mut impl Write) -> Result<()> {
    match query {
        Query::Prices => {
            writeln!(out, "first_mint_price {}", format_ether(ledger.first_mint_price()))?;
            writeln!(out, "mint_price       {}", format_ether(ledger.mint_price()))?;
            writeln!(out, "stake_price      {}", format_ether(ledger.stake_price()))?;
        }
        Query::FirstMinted { account } => writeln!(out, "{}", ledger.first_minted(&account))?,
        Query::Authorities { grantor, holder } => {
            writeln!(out, "{}", ledger.mintable_authorities(&grantor, &holder))?
        }
        Query::Card { owner, index } => {
            let card = ledger.card_by_owner(&owner, index)?;
            writeln!(out, "{}", serde_json::to_string_pretty(card)?)?;
        }
        Query::Cards { owner } => {
            for card in ledger.cards_by_owner(&owner) {
                writeln!(out, "{}", serde_json::to_string(card)?)?;
            }
        }
        Query::Stake { account } => {
            writeln!(out, "{}", format_ether(ledger.stake_balance(&account)))?
        }
        Query::Nonce { grantor } => writeln!(out, "{}", ledger.permit_nonce(&grantor))?,
        Query::LedgerId => writeln!(out, "{}", ledger.ledger_id())?,
    }
    Ok(())
}

fn describe_card_type(card_type: &CardType) -> String {
    match card_type {
        CardType::Personal => "personal".to_string(),
        CardType::Company { company } => format!("company {}", company),
    }
}

//==================== main ====================//

fn run(cli: Cli) -> Result<()> {
    let store = StateFile::new(cli.state);
    match cli.command {
        Command::Init {
            from,
            config,
            first_mint_price,
            mint_price,
            stake_price,
            ledger_id,
        } => init_cmd(
            &store,
            from,
            config,
            [first_mint_price, mint_price, stake_price],
            ledger_id,
        ),
        Command::Mint {
            from,
            payment,
            beneficiary,
        } => execute_cmd(
            &store,
            from,
            LedgerCall::Mint {
                payment,
                beneficiary,
            },
        ),
        Command::CreateCard(args) => {
            let mut request =
                CardRequest::new(args.name, args.email, args.phone, args.recipient, args.value);
            request.grantor = args.grantor;
            execute_cmd(&store, args.from, LedgerCall::CreateCard(request))
        }
        Command::Stake { from, payment } => {
            execute_cmd(&store, from, LedgerCall::Stake { payment })
        }
        Command::Keygen { out_dir } => keygen_cmd(out_dir),
        Command::PermitSign {
            sk_hex,
            holder,
            nonce,
            ledger_id,
        } => permit_sign_cmd(&store, &sk_hex, holder, nonce, ledger_id),
        Command::PermitRelay {
            from,
            payment,
            token,
        } => {
            let permit = Permit::from_token(&token)?;
            execute_cmd(&store, from, LedgerCall::MintWithPermit { payment, permit })
        }
        Command::Query(query) => query_cmd(&store.load()?, query, &mut io::stdout().lock()),
        Command::Events => {
            for event in store.load()?.events() {
                println!("{}", serde_json::to_string(event)?);
            }
            Ok(())
        }
        Command::Snapshot => {
            let snapshot = store.load()?.snapshot();
            println!("height     {}", snapshot.height);
            println!("events     {}", snapshot.events);
            println!("state_root {}", hex::encode(snapshot.state_root));
            Ok(())
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            let caller_error = err
                .downcast_ref::<LedgerError>()
                .is_some_and(LedgerError::is_caller_error);
            ExitCode::from(if caller_error { 2 } else { 1 })
        }
    }
}
