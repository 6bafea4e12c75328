use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

fn leadlens_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("leadlens");
    path
}

fn write_fixtures(root: &Path) {
    let tenants_dir = root.join("tenants");
    fs::create_dir_all(&tenants_dir).unwrap();
    fs::create_dir_all(root.join("data")).unwrap();

    // One tenant backed by a local leads file, so tests run offline.
    fs::write(
        tenants_dir.join("acme.json"),
        r#"{ "provider": "file", "leads_path": "acme.leads.json" }"#,
    )
    .unwrap();
    fs::write(
        tenants_dir.join("acme.leads.json"),
        r#"[
  {
    "id": "L-100",
    "clientDetails": { "name": "Meera Joshi", "city": "Pune" },
    "projectStage": "Design",
    "assignedTo": "Ravi",
    "assignedToId": "usr_2",
    "createdById": "usr_1",
    "createdBy": "Asha",
    "updatedAt": "2025-01-15T10:30:00Z"
  },
  {
    "id": "L-101",
    "clientDetails": { "name": "Dev Patel", "city": "Mumbai" },
    "status": "n/a",
    "assignedTo": "Ravi",
    "assignedToId": "usr_2",
    "updatedAt": "2025-01-16T09:00:00Z"
  },
  {
    "id": "L-102",
    "clientDetails": { "name": "Sana Khan" },
    "assignedTo": "Priya",
    "assignedToId": "usr_3",
    "updatedAt": "2025-01-17T14:45:00Z"
  }
]"#,
    )
    .unwrap();

    // A tenant whose credential file is missing a required field.
    fs::write(
        tenants_dir.join("globex.json"),
        r#"{ "provider": "rest", "base_url": "https://globex.example.com" }"#,
    )
    .unwrap();
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();
    write_fixtures(&root);

    let config_content = format!(
        r#"[db]
path = "{}/data/leadlens.sqlite"

[tenants]
credentials_dir = "{}/tenants"

[server]
bind = "127.0.0.1:7441"
"#,
        root.display(),
        root.display()
    );

    let config_path = root.join("leadlens.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

/// Like [`setup_test_env`], with embedding and vector store pointed at a
/// local stub so full (non-dry-run) syncs work offline.
fn setup_test_env_with_services(addr: &SocketAddr) -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();
    write_fixtures(&root);

    let config_content = format!(
        r#"[db]
path = "{root}/data/leadlens.sqlite"

[tenants]
credentials_dir = "{root}/tenants"

[embedding]
provider = "ollama"
model = "stub-embed"
dims = 2
url = "http://{addr}"

[vectorstore]
base_url = "http://{addr}"
max_attempts = 1
jitter = false

[server]
bind = "127.0.0.1:7441"
"#,
        root = root.display(),
        addr = addr
    );

    let config_path = root.join("leadlens.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

/// Stub embedding + vector store on one port. Returns the bound address
/// and a counter of every point the store received across upsert calls.
/// With `acknowledge_all` false the upsert response acknowledges at most
/// one point per batch regardless of how many were sent.
fn spawn_stub_services(acknowledge_all: bool) -> (SocketAddr, Arc<AtomicUsize>) {
    use axum::{routing::post, Json, Router};

    let seen_points = Arc::new(AtomicUsize::new(0));
    let counter = seen_points.clone();
    let (tx, rx) = std::sync::mpsc::channel();

    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async move {
            let embed = post(|Json(body): Json<serde_json::Value>| async move {
                let n = body["input"].as_array().map(|a| a.len()).unwrap_or(0);
                let embeddings: Vec<Vec<f64>> = (0..n).map(|i| vec![i as f64, 0.5]).collect();
                Json(serde_json::json!({ "embeddings": embeddings }))
            });
            let upsert = post(move |Json(body): Json<serde_json::Value>| {
                let counter = counter.clone();
                async move {
                    let n = body["vectors"].as_array().map(|a| a.len()).unwrap_or(0);
                    counter.fetch_add(n, Ordering::SeqCst);
                    let acknowledged = if acknowledge_all { n } else { n.min(1) };
                    Json(serde_json::json!({ "upsertedCount": acknowledged }))
                }
            });
            let app = Router::new()
                .route("/api/embed", embed)
                .route("/{index}/vectors/upsert", upsert);
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            tx.send(listener.local_addr().unwrap()).unwrap();
            axum::serve(listener, app).await.unwrap();
        });
    });

    (rx.recv().unwrap(), seen_points)
}

fn run_leadlens(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = leadlens_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run leadlens binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

#[test]
fn test_init_creates_ledger() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_leadlens(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_leadlens(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_leadlens(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_tenants_listing() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, _, success) = run_leadlens(&config_path, &["tenants"]);
    assert!(success, "tenants failed: {}", stdout);
    assert!(stdout.contains("acme"));
    assert!(stdout.contains("globex"));
    // acme's file credentials are complete; globex's rest credentials
    // are missing the api key.
    assert!(stdout.contains("ok"));
    assert!(stdout.contains("incomplete"));
}

#[test]
fn test_sync_dry_run_counts() {
    let (_tmp, config_path) = setup_test_env();

    run_leadlens(&config_path, &["init"]);
    let (stdout, stderr, success) = run_leadlens(&config_path, &["sync", "acme", "--dry-run"]);
    assert!(success, "dry-run failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("dry-run"));
    assert!(stdout.contains("fetched: 3"));
    assert!(stdout.contains("would upsert: 3"));
    assert!(stdout.contains("skipped (unchanged): 0"));
}

#[test]
fn test_sync_upserts_then_skips_unchanged() {
    let (addr, seen_points) = spawn_stub_services(true);
    let (_tmp, config_path) = setup_test_env_with_services(&addr);

    run_leadlens(&config_path, &["init"]);

    // First sync embeds and upserts everything.
    let (stdout, stderr, success) = run_leadlens(&config_path, &["sync", "acme"]);
    assert!(success, "sync failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("upserted: 3"), "got: {}", stdout);
    assert!(stdout.contains("skipped (unchanged): 0"), "got: {}", stdout);
    assert!(stdout.contains("ok"));
    assert_eq!(seen_points.load(Ordering::SeqCst), 3);

    // Second sync finds the ledger up to date and sends nothing.
    let (stdout, _, success) = run_leadlens(&config_path, &["sync", "acme"]);
    assert!(success);
    assert!(stdout.contains("upserted: 0"), "got: {}", stdout);
    assert!(stdout.contains("skipped (unchanged): 3"), "got: {}", stdout);
    assert_eq!(seen_points.load(Ordering::SeqCst), 3, "store received new points");
}

#[test]
fn test_sync_force_reembeds_everything() {
    let (addr, seen_points) = spawn_stub_services(true);
    let (_tmp, config_path) = setup_test_env_with_services(&addr);

    run_leadlens(&config_path, &["init"]);
    run_leadlens(&config_path, &["sync", "acme"]);

    // --force ignores the ledger entirely.
    let (stdout, stderr, success) = run_leadlens(&config_path, &["sync", "acme", "--force"]);
    assert!(success, "forced sync failed: {}", stderr);
    assert!(stdout.contains("upserted: 3"), "got: {}", stdout);
    assert!(stdout.contains("skipped (unchanged): 0"), "got: {}", stdout);
    assert_eq!(seen_points.load(Ordering::SeqCst), 6);
}

#[test]
fn test_sync_reports_store_acknowledged_count() {
    // The store takes every point but acknowledges only one per batch.
    let (addr, seen_points) = spawn_stub_services(false);
    let (_tmp, config_path) = setup_test_env_with_services(&addr);

    run_leadlens(&config_path, &["init"]);
    let (stdout, _, success) = run_leadlens(&config_path, &["sync", "acme"]);
    assert!(success);
    assert_eq!(seen_points.load(Ordering::SeqCst), 3);
    assert!(stdout.contains("upserted: 1"), "got: {}", stdout);
}

#[test]
fn test_sync_dry_run_assignee_filter() {
    let (_tmp, config_path) = setup_test_env();

    run_leadlens(&config_path, &["init"]);
    let (stdout, _, success) = run_leadlens(
        &config_path,
        &["sync", "acme", "--dry-run", "--assigned-to-id", "usr_2"],
    );
    assert!(success, "dry-run failed: {}", stdout);
    assert!(stdout.contains("fetched: 3"));
    assert!(stdout.contains("filtered out: 1"));
    assert!(stdout.contains("would upsert: 2"));
}

#[test]
fn test_sync_dry_run_assignee_name_filter() {
    let (_tmp, config_path) = setup_test_env();

    run_leadlens(&config_path, &["init"]);
    let (stdout, _, success) = run_leadlens(
        &config_path,
        &["sync", "acme", "--dry-run", "--assigned-to", "Priya"],
    );
    assert!(success, "dry-run failed: {}", stdout);
    assert!(stdout.contains("filtered out: 2"));
    assert!(stdout.contains("would upsert: 1"));
}

#[test]
fn test_sync_unknown_tenant_fails() {
    let (_tmp, config_path) = setup_test_env();

    run_leadlens(&config_path, &["init"]);
    let (_, stderr, success) = run_leadlens(&config_path, &["sync", "ghost", "--dry-run"]);
    assert!(!success, "sync for unknown tenant should fail");
    assert!(
        stderr.contains("no credentials registered for tenant"),
        "unexpected error: {}",
        stderr
    );
}

#[test]
fn test_sync_requires_embedding_provider() {
    let (_tmp, config_path) = setup_test_env();

    run_leadlens(&config_path, &["init"]);
    // A real (non-dry-run) sync needs an embedding provider; the default
    // config disables it.
    let (_, stderr, success) = run_leadlens(&config_path, &["sync", "acme"]);
    assert!(!success, "sync without embedding provider should fail");
    assert!(
        stderr.contains("disabled"),
        "unexpected error: {}",
        stderr
    );
}

#[test]
fn test_sync_dry_run_counts_records_without_id() {
    let (tmp, config_path) = setup_test_env();

    // Add a record with no id alongside a valid one.
    fs::write(
        tmp.path().join("tenants").join("acme.leads.json"),
        r#"[
  { "id": "L-200", "clientDetails": { "name": "Arjun Rao" } },
  { "clientDetails": { "name": "No Id Here" } }
]"#,
    )
    .unwrap();

    run_leadlens(&config_path, &["init"]);
    let (stdout, stderr, success) = run_leadlens(&config_path, &["sync", "acme", "--dry-run"]);
    assert!(success, "dry-run failed: {}", stderr);
    assert!(stdout.contains("fetched: 2"));
    assert!(stdout.contains("would upsert: 1"));
    assert!(
        stderr.contains("without an id") && stderr.contains("counted as failed"),
        "expected missing-id warning, got: {}",
        stderr
    );
}

#[test]
fn test_sync_dry_run_dedupes_repeated_ids() {
    let (tmp, config_path) = setup_test_env();

    // The same lead id twice; the later record wins and only one
    // document is produced.
    fs::write(
        tmp.path().join("tenants").join("acme.leads.json"),
        r#"[
  { "id": "L-300", "projectStage": "Design" },
  { "id": "L-300", "projectStage": "Execution" }
]"#,
    )
    .unwrap();

    run_leadlens(&config_path, &["init"]);
    let (stdout, _, success) = run_leadlens(&config_path, &["sync", "acme", "--dry-run"]);
    assert!(success);
    assert!(stdout.contains("fetched: 2"));
    assert!(stdout.contains("would upsert: 1"));
}

#[test]
fn test_ask_empty_question_rejected() {
    let (_tmp, config_path) = setup_test_env();

    run_leadlens(&config_path, &["init"]);
    let (_, stderr, success) = run_leadlens(&config_path, &["ask", "acme", "   "]);
    assert!(!success, "empty question should fail");
    assert!(
        stderr.contains("question must not be empty"),
        "unexpected error: {}",
        stderr
    );
}

#[test]
fn test_ask_unknown_tenant_rejected() {
    let (_tmp, config_path) = setup_test_env();

    run_leadlens(&config_path, &["init"]);
    let (_, stderr, success) = run_leadlens(&config_path, &["ask", "ghost", "any updates?"]);
    assert!(!success);
    assert!(stderr.contains("no credentials registered for tenant"));
}

#[test]
fn test_missing_config_fails_cleanly() {
    let (tmp, _) = setup_test_env();
    let absent = tmp.path().join("nope.toml");

    let (_, stderr, success) = run_leadlens(&absent, &["init"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"));
}
