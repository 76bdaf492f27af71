//! Verdant Policy Engine — Demo CLI
//!
//! Walks through the policy lifecycle end to end against in-memory
//! collaborators: draft creation, dry-run with virtual users, block
//! interaction, publication to the (simulated) ledger, archive export and
//! re-import, and contract cache synchronization.
//!
//! Usage:
//!   cargo run -p demo -- run-all
//!   cargo run -p demo -- lifecycle
//!   cargo run -p demo -- dry-run
//!   cargo run -p demo -- contracts

use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde_json::json;
use tracing_subscriber::EnvFilter;

use verdant_blocks::registry::ComponentRegistry;
use verdant_contracts::{
    block::BlockConfig,
    contract::{ContractType, TokenInfo},
    error::EngineResult,
    policy::Policy,
    schema::{SchemaDocument, SchemaStatus},
    user::{AuthUser, UserRole},
};
use verdant_engine::{
    memory::{
        BufferedEventBus, InMemoryDirectory, InMemoryLedger, InMemorySchemaRegistry,
        InMemoryStore, SimpleCredentialIssuer,
    },
    StateCore, UserResolver,
};
use verdant_lifecycle::{LifecycleManager, PolicyEngineService};
use verdant_sync::{ContractSyncAdapter, InMemoryContractStore};

mod simulated_node;

use simulated_node::SimulatedContractNode;

// ── CLI definition ────────────────────────────────────────────────────────────

/// Verdant — policy-driven environmental asset lifecycle demo.
#[derive(Parser)]
#[command(
    name = "demo",
    about = "Verdant policy engine walkthrough",
    long_about = "Walks the verdant policy engine through its lifecycle against\n\
                  in-memory collaborators: draft, dry-run, publish, import/export,\n\
                  and contract cache synchronization."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run every scenario in sequence.
    RunAll,
    /// Scenario 1: create, publish, export and re-import a policy.
    Lifecycle,
    /// Scenario 2: dry-run sandbox with virtual users and block interaction.
    DryRun,
    /// Scenario 3: contract pair and wipe-request cache synchronization.
    Contracts,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    // Initialize structured logging. Set RUST_LOG=debug for verbose output.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();

    print_banner();

    let result = match cli.command {
        Command::RunAll => run_all().await,
        Command::Lifecycle => run_lifecycle().await,
        Command::DryRun => run_dry_run().await,
        Command::Contracts => run_contracts().await,
    };

    match result {
        Ok(()) => {
            println!("All selected scenarios completed successfully.");
        }
        Err(e) => {
            eprintln!("Demo error: {}", e);
            std::process::exit(1);
        }
    }
}

async fn run_all() -> EngineResult<()> {
    run_lifecycle().await?;
    run_dry_run().await?;
    run_contracts().await?;
    Ok(())
}

// ── Shared wiring ─────────────────────────────────────────────────────────────

struct Runtime {
    service: Arc<PolicyEngineService>,
    schemas: Arc<InMemorySchemaRegistry>,
}

/// Wire a full engine against in-memory collaborators.
fn runtime() -> Runtime {
    let registry = Arc::new(ComponentRegistry::new());
    let store = Arc::new(InMemoryStore::new());
    let bus = Arc::new(BufferedEventBus::new());
    let state = Arc::new(StateCore::new(registry.clone(), store.clone(), bus));
    let users = Arc::new(UserResolver::new(store.clone()));
    let schemas = Arc::new(InMemorySchemaRegistry::new());
    let directory = Arc::new(InMemoryDirectory::new());
    directory.register(standard_registry());
    let manager = Arc::new(LifecycleManager::new(
        registry,
        state.clone(),
        store.clone(),
        Arc::new(InMemoryLedger::new()),
        schemas.clone(),
        Arc::new(SimpleCredentialIssuer),
        users.clone(),
    ));
    let service = Arc::new(PolicyEngineService::new(
        manager, state, users, directory, store,
    ));
    Runtime { service, schemas }
}

fn standard_registry() -> AuthUser {
    AuthUser::new("registry", "did:registry:demo", UserRole::StandardRegistry)
}

/// A small methodology: pick a role, file a report, browse the reports.
fn carbon_model() -> Policy {
    let mut model = Policy::new_draft("Carbon Sequestration", "");
    model.description = "Soil carbon reporting for smallholder farms".to_string();
    model.config = Some(
        BlockConfig::new("interfaceContainerBlock", "root").with_children(vec![
            BlockConfig::new("policyRolesBlock", "choose_role")
                .with_options(json!({ "roles": ["Farmer", "Verifier"] })),
            BlockConfig::new("requestVcDocumentBlock", "report")
                .with_options(json!({ "schema": "#soil-report" })),
            BlockConfig::new("documentsSourceAddon", "reports")
                .with_options(json!({ "schema": "#soil-report" }))
                .with_children(vec![BlockConfig::new("paginationAddon", "pager")]),
        ]),
    );
    model
}

fn soil_report_schema(topic_id: &str, owner: &str) -> SchemaDocument {
    SchemaDocument {
        iri: "#soil-report".to_string(),
        name: "Soil Carbon Report".to_string(),
        version: String::new(),
        status: SchemaStatus::Draft,
        topic_id: topic_id.to_string(),
        owner: owner.to_string(),
        system: false,
        document: json!({ "type": "object", "properties": { "co2": { "type": "number" } } }),
    }
}

// ── Scenario 1: lifecycle ─────────────────────────────────────────────────────

async fn run_lifecycle() -> EngineResult<()> {
    use verdant_engine::traits::SchemaRegistry as _;

    println!("Scenario 1: draft → publish → export → import");
    println!("---------------------------------------------");

    let rt = runtime();
    let owner = standard_registry();

    let policy = rt.service.create_policy(carbon_model(), &owner).await?;
    let topic = policy.topic_id.clone().unwrap_or_default();
    println!("  created '{}' on topic {}", policy.name, topic);

    rt.schemas
        .track_schema(&soil_report_schema(&topic, &owner.did))
        .await?;

    let response = rt.service.publish_policy(&policy.id, &owner, "1.0.0").await?;
    let published = match response.policy {
        Some(p) => p,
        None => {
            println!("  publish refused: {:?}", response.report);
            return Ok(());
        }
    };
    println!(
        "  published v{} as message {}",
        published.version,
        published.message_id.clone().unwrap_or_default()
    );

    let bytes = rt.service.export_file(&published.id).await?;
    let preview = rt.service.preview_file(&bytes)?;
    println!(
        "  exported archive: {} bytes, {} blocks, {} schema(s)",
        bytes.len(),
        preview.block_count,
        preview.schemas.len()
    );

    // A second standard registry imports the archive as a fresh draft.
    let importer = AuthUser::new("partner", "did:registry:partner", UserRole::StandardRegistry);
    let imported = rt.service.import_file(&bytes, &importer).await?;
    println!(
        "  imported as '{}' (draft, owner {})",
        imported.name, imported.owner
    );
    println!();
    Ok(())
}

// ── Scenario 2: dry-run ───────────────────────────────────────────────────────

async fn run_dry_run() -> EngineResult<()> {
    println!("Scenario 2: dry-run sandbox with virtual users");
    println!("----------------------------------------------");

    let rt = runtime();
    let owner = standard_registry();
    let policy = rt.service.create_policy(carbon_model(), &owner).await?;

    rt.service.dry_run_policy(&policy.id, &owner).await?;
    let virtuals = rt.service.get_virtual_users(&policy.id, &owner).await?;
    println!(
        "  dry-run started, impersonating '{}'",
        virtuals[0].username
    );

    rt.service
        .set_block_data_by_tag(&policy.id, "choose_role", &owner, json!({ "role": "Farmer" }))
        .await?;
    rt.service
        .set_block_data_by_tag(
            &policy.id,
            "report",
            &owner,
            json!({ "document": { "co2": 12.5, "field": "north-40" } }),
        )
        .await?;
    println!("  filed one soil report as Farmer");

    let (_, total) = rt
        .service
        .get_virtual_documents(&policy.id, &owner, None, 0, 10)
        .await?;
    println!("  sandbox holds {} virtual document(s)", total);

    let listing = rt
        .service
        .get_block_data_by_tag(&policy.id, "reports", &owner)
        .await?;
    let count = listing.get("total").and_then(serde_json::Value::as_u64).unwrap_or(0);
    println!("  reports source now shows {} document(s)", count);

    rt.service.restart_dry_run(&policy.id, &owner).await?;
    let listing = rt
        .service
        .get_block_data_by_tag(&policy.id, "reports", &owner)
        .await?;
    let count = listing.get("total").and_then(serde_json::Value::as_u64).unwrap_or(0);
    println!("  after restart the sandbox shows {} document(s)", count);

    rt.service.draft_policy(&policy.id, &owner).await?;
    println!("  reverted to draft");
    println!();
    Ok(())
}

// ── Scenario 3: contracts ─────────────────────────────────────────────────────

async fn run_contracts() -> EngineResult<()> {
    println!("Scenario 3: contract cache synchronization");
    println!("------------------------------------------");

    let node = Arc::new(SimulatedContractNode::new());
    let store = Arc::new(InMemoryContractStore::new());
    let adapter = ContractSyncAdapter::new(store, node.clone());

    let contract = adapter
        .create_contract("did:registry:demo", "Retire CO2 against credits", ContractType::Retire)
        .await?;
    println!("  deployed retire contract {}", contract.contract_id);

    let co2 = TokenInfo {
        token_id: "0.0.7001".to_string(),
        symbol: "CO2".to_string(),
        decimals: 2,
    };
    let credit = TokenInfo {
        token_id: "0.0.7002".to_string(),
        symbol: "CRC".to_string(),
        decimals: 0,
    };
    let pair = adapter
        .add_pair(&contract.contract_id, &co2, &credit, 5, 1, false)
        .await?;
    println!(
        "  registered pair {} x{} ↔ {} x{}",
        pair.base_symbol, pair.base_count, pair.opposite_symbol, pair.opposite_count
    );

    // The node enables the pair out of band; a re-sync picks it up while
    // the availability patch stays local.
    node.enable_pair(&pair.base, &pair.opposite);
    let pairs = adapter.sync_pairs(&contract.contract_id).await?;
    println!("  re-sync sees {} pair(s) on the ledger", pairs.len());

    let patched = adapter
        .sync_pair_availability(&contract.contract_id, &pair.base, &pair.opposite, true)
        .await?;
    println!("  pair marked available: {}", patched.available);

    let pending = adapter.sync_retire_requests(&contract.contract_id).await?;
    println!("  {} retire request(s) pending", pending.len());
    println!();
    Ok(())
}

// ── Banner ────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("Verdant — Policy-driven Asset Lifecycle Engine");
    println!("==============================================");
    println!();
    println!("Each scenario wires the real engine against in-memory collaborators:");
    println!("  [1] Lifecycle manager owns every status transition");
    println!("  [2] Blocks run behind availability checks and per-user locks");
    println!("  [3] Dry-run documents live in a sandbox, wiped on restart");
    println!("  [4] Publication is atomic: no store write until the ledger accepts");
    println!();
}
