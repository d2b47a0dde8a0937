// policy.rs — Policy subcommands: apply, create, update, delete, refresh, show, list.
//
// This is the orchestrator side of the reconciler: it reads descriptor
// files, looks up the stored handle, picks the verb, and records whatever
// handle comes back (including failed handles, so the next run sees them).

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Subcommand;
use tokio::runtime::Runtime;
use tokio::task::JoinSet;

use gr_policy::PolicyDescriptor;
use gr_reconciler::{
    ErrorKind, HandleStore, PolicyHandle, ReconcileFailure, ReconcileOutcome, ReconcileRequest,
    SerializedReconciler,
};

use crate::config::GuardrailConfig;

#[derive(Subcommand)]
pub enum PolicyCommands {
    /// Create or update each descriptor so the remote matches it.
    Apply {
        /// Descriptor files (YAML or JSON).
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Create a guardrail from a descriptor.
    Create {
        /// Descriptor file (YAML or JSON).
        file: PathBuf,
    },
    /// Push a changed descriptor to its existing guardrail.
    Update {
        /// Descriptor file (YAML or JSON).
        file: PathBuf,
    },
    /// Delete a guardrail.
    Delete {
        name: String,
        #[arg(long = "env")]
        environment: String,
    },
    /// Re-read a guardrail's remote state into its handle.
    Refresh {
        name: String,
        #[arg(long = "env")]
        environment: String,
    },
    /// Show the stored handle for a policy.
    Show {
        name: String,
        #[arg(long = "env")]
        environment: String,
    },
    /// List stored handles.
    List {
        /// Only show handles in this environment.
        #[arg(long = "env")]
        environment: Option<String>,
    },
}

pub fn execute(cmd: &PolicyCommands, config: &GuardrailConfig) -> anyhow::Result<()> {
    let store = HandleStore::new(&config.handles_dir)?;

    match cmd {
        PolicyCommands::Show { name, environment } => return show_handle(&store, environment, name),
        PolicyCommands::List { environment } => return list_handles(&store, environment.as_deref()),
        _ => {}
    }

    let reconciler = Arc::new(SerializedReconciler::new(config.build_reconciler()?));
    let runtime = Runtime::new().context("failed to start async runtime")?;
    let deadline = config.deadline();

    runtime.block_on(async {
        match cmd {
            PolicyCommands::Apply { files } => {
                apply_all(reconciler, Arc::new(store), files, deadline).await
            }
            PolicyCommands::Create { file } => {
                let descriptor = load_descriptor(file)?;
                let handle = create(&reconciler, &store, descriptor, deadline).await?;
                print_handle("Created", &handle);
                Ok(())
            }
            PolicyCommands::Update { file } => {
                let descriptor = load_descriptor(file)?;
                let handle = update(&reconciler, &store, descriptor, deadline).await?;
                print_handle("Updated", &handle);
                Ok(())
            }
            PolicyCommands::Delete { name, environment } => {
                delete(&reconciler, &store, environment, name, deadline).await
            }
            PolicyCommands::Refresh { name, environment } => {
                refresh(&reconciler, &store, environment, name).await
            }
            PolicyCommands::Show { .. } | PolicyCommands::List { .. } => Ok(()),
        }
    })
}

fn load_descriptor(path: &Path) -> anyhow::Result<PolicyDescriptor> {
    PolicyDescriptor::load(path).with_context(|| format!("failed to load descriptor {}", path.display()))
}

async fn run(
    reconciler: &SerializedReconciler,
    request: ReconcileRequest,
    deadline: Option<Duration>,
) -> Result<ReconcileOutcome, ReconcileFailure> {
    match deadline {
        Some(timeout) => reconciler.reconcile_with_timeout(request, timeout).await,
        None => reconciler.reconcile(request).await,
    }
}

/// Persist the handle a failure reports, then turn the failure into an error.
fn record_failure(store: &HandleStore, failure: ReconcileFailure) -> anyhow::Error {
    if let Some(handle) = &failure.handle {
        if let Err(e) = store.save(handle) {
            tracing::warn!("failed to record handle {}: {}", handle.identity(), e);
        }
    }
    let retryable = failure.error.is_retryable();
    anyhow::Error::new(failure).context(if retryable {
        "retryable failure"
    } else {
        "non-retryable failure"
    })
}

pub(crate) async fn create(
    reconciler: &SerializedReconciler,
    store: &HandleStore,
    descriptor: PolicyDescriptor,
    deadline: Option<Duration>,
) -> anyhow::Result<PolicyHandle> {
    if let Some(existing) = store.get(&descriptor.environment, &descriptor.name)? {
        bail!(
            "{} already has guardrail {}; use `policy update` or `policy apply`",
            existing.identity(),
            existing.remote_id
        );
    }

    let outcome = run(reconciler, ReconcileRequest::Create { descriptor }, deadline)
        .await
        .map_err(|f| record_failure(store, f))?;
    let Some(handle) = outcome.handle else {
        bail!("create returned no handle");
    };
    store.save(&handle)?;
    Ok(handle)
}

pub(crate) async fn update(
    reconciler: &SerializedReconciler,
    store: &HandleStore,
    descriptor: PolicyDescriptor,
    deadline: Option<Duration>,
) -> anyhow::Result<PolicyHandle> {
    let Some(handle) = store.get(&descriptor.environment, &descriptor.name)? else {
        bail!(
            "no handle for {}; create it first with `policy create`",
            descriptor.identity()
        );
    };

    let outcome = run(
        reconciler,
        ReconcileRequest::Update { descriptor, handle },
        deadline,
    )
    .await
    .map_err(|f| record_failure(store, f))?;
    let Some(handle) = outcome.handle else {
        bail!("update returned no handle");
    };
    store.save(&handle)?;
    Ok(handle)
}

/// Converge one descriptor: create when there is no handle, update
/// otherwise, and recreate when the remote guardrail has vanished.
pub(crate) async fn apply(
    reconciler: &SerializedReconciler,
    store: &HandleStore,
    descriptor: PolicyDescriptor,
    deadline: Option<Duration>,
) -> anyhow::Result<PolicyHandle> {
    let Some(handle) = store.get(&descriptor.environment, &descriptor.name)? else {
        return create(reconciler, store, descriptor, deadline).await;
    };

    let request = ReconcileRequest::Update {
        descriptor: descriptor.clone(),
        handle,
    };
    match run(reconciler, request, deadline).await {
        Ok(ReconcileOutcome {
            handle: Some(handle),
            ..
        }) => {
            store.save(&handle)?;
            Ok(handle)
        }
        Ok(_) => bail!("update returned no handle"),
        Err(failure) if failure.kind() == ErrorKind::NotFound => {
            tracing::info!(
                policy = %descriptor.identity(),
                "guardrail vanished remotely; recreating"
            );
            store.remove(&descriptor.environment, &descriptor.name)?;
            create(reconciler, store, descriptor, deadline).await
        }
        Err(failure) => Err(record_failure(store, failure)),
    }
}

async fn apply_all(
    reconciler: Arc<SerializedReconciler>,
    store: Arc<HandleStore>,
    files: &[PathBuf],
    deadline: Option<Duration>,
) -> anyhow::Result<()> {
    // Every descriptor must load and validate before any apply is spawned.
    let mut descriptors = Vec::with_capacity(files.len());
    let mut rejected = Vec::new();
    for file in files {
        match load_descriptor(file).and_then(|d| {
            d.validate()
                .with_context(|| format!("invalid descriptor {}", file.display()))?;
            Ok(d)
        }) {
            Ok(descriptor) => descriptors.push(descriptor),
            Err(e) => rejected.push(format!("{:#}", e)),
        }
    }
    if !rejected.is_empty() {
        for reason in &rejected {
            eprintln!("{}", reason);
        }
        bail!(
            "{} of {} descriptors are invalid; nothing was applied",
            rejected.len(),
            files.len()
        );
    }

    let mut tasks = JoinSet::new();
    for descriptor in descriptors {
        let reconciler = reconciler.clone();
        let store = store.clone();
        let identity = descriptor.identity();
        tasks.spawn(async move {
            let result = apply(&reconciler, &store, descriptor, deadline).await;
            (identity, result)
        });
    }

    let mut failures = 0;
    while let Some(joined) = tasks.join_next().await {
        let (identity, result) = match joined {
            Ok(joined) => joined,
            Err(e) => {
                failures += 1;
                eprintln!("apply task failed: {}", e);
                continue;
            }
        };
        match result {
            Ok(handle) => print_handle("Applied", &handle),
            Err(e) => {
                failures += 1;
                eprintln!("{}: {:#}", identity, e);
            }
        }
    }

    if failures > 0 {
        bail!("{} of {} policies failed to apply", failures, files.len());
    }
    Ok(())
}

pub(crate) async fn delete(
    reconciler: &SerializedReconciler,
    store: &HandleStore,
    environment: &str,
    name: &str,
    deadline: Option<Duration>,
) -> anyhow::Result<()> {
    let Some(handle) = store.get(environment, name)? else {
        println!("No handle for {}/{}; nothing to delete.", environment, name);
        return Ok(());
    };
    let remote_id = handle.remote_id.clone();

    run(reconciler, ReconcileRequest::Delete { handle }, deadline)
        .await
        .map_err(|f| record_failure(store, f))?;
    store.remove(environment, name)?;
    println!("Deleted {}/{} ({})", environment, name, remote_id);
    Ok(())
}

async fn refresh(
    reconciler: &SerializedReconciler,
    store: &HandleStore,
    environment: &str,
    name: &str,
) -> anyhow::Result<()> {
    let Some(handle) = store.get(environment, name)? else {
        bail!("no handle for {}/{}", environment, name);
    };

    match reconciler.inner().refresh(&handle).await? {
        Some(refreshed) => {
            store.save(&refreshed)?;
            print_handle("Refreshed", &refreshed);
        }
        None => {
            store.remove(environment, name)?;
            println!(
                "{} ({}) no longer exists remotely; handle removed.",
                handle.identity(),
                handle.remote_id
            );
        }
    }
    Ok(())
}

fn show_handle(store: &HandleStore, environment: &str, name: &str) -> anyhow::Result<()> {
    let Some(h) = store.get(environment, name)? else {
        bail!("no handle for {}/{}", environment, name);
    };
    println!("Policy:    {}", h.identity());
    println!("Remote ID: {}", h.remote_id);
    println!("Version:   {}", h.version);
    println!("Status:    {}", h.status);
    println!("Updated:   {}", h.updated_at.to_rfc3339());
    if let Some(ref error) = h.last_error {
        println!("Error:     {}", error);
    }
    Ok(())
}

fn list_handles(store: &HandleStore, environment: Option<&str>) -> anyhow::Result<()> {
    let handles: Vec<PolicyHandle> = store
        .list()?
        .into_iter()
        .filter(|h| environment.map_or(true, |env| h.environment == env))
        .collect();

    if handles.is_empty() {
        println!("No policies found.");
        return Ok(());
    }

    println!(
        "{:<32} {:<16} {:<8} {:<10} {:<25}",
        "POLICY", "REMOTE ID", "VERSION", "STATUS", "UPDATED"
    );
    println!("{}", "-".repeat(95));
    for h in &handles {
        println!(
            "{:<32} {:<16} {:<8} {:<10} {:<25}",
            h.identity(),
            h.remote_id,
            h.version,
            h.status.to_string(),
            h.updated_at.format("%Y-%m-%d %H:%M:%S"),
        );
    }
    println!("\n{} policy(ies) total.", handles.len());
    Ok(())
}

fn print_handle(action: &str, handle: &PolicyHandle) {
    println!(
        "{} {} → {} (version {}, {})",
        action,
        handle.identity(),
        handle.remote_id,
        handle.version,
        handle.status
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use gr_reconciler::{HandleStatus, InMemoryGuardrailApi, ReconcileError, Reconciler};
    use tempfile::tempdir;

    fn setup() -> (Arc<InMemoryGuardrailApi>, SerializedReconciler) {
        let api = Arc::new(InMemoryGuardrailApi::new());
        let reconciler = SerializedReconciler::new(Reconciler::new(api.clone()));
        (api, reconciler)
    }

    fn descriptor() -> PolicyDescriptor {
        PolicyDescriptor::new("safety", "dev")
            .with_blocked_term("hack")
            .with_blocked_term("exploit")
    }

    #[tokio::test]
    async fn create_persists_handle_and_refuses_duplicates() {
        let dir = tempdir().unwrap();
        let store = HandleStore::new(dir.path()).unwrap();
        let (api, reconciler) = setup();

        let handle = create(&reconciler, &store, descriptor(), None).await.unwrap();
        assert_eq!(store.get("dev", "safety").unwrap(), Some(handle));

        let err = create(&reconciler, &store, descriptor(), None).await.unwrap_err();
        assert!(err.to_string().contains("already has guardrail"));
        assert_eq!(api.calls().create, 1);
    }

    #[tokio::test]
    async fn apply_creates_then_updates() {
        let dir = tempdir().unwrap();
        let store = HandleStore::new(dir.path()).unwrap();
        let (api, reconciler) = setup();

        let first = apply(&reconciler, &store, descriptor(), None).await.unwrap();
        let second = apply(
            &reconciler,
            &store,
            descriptor().with_blocked_term("malware"),
            None,
        )
        .await
        .unwrap();

        assert_eq!(first.remote_id, second.remote_id);
        assert_eq!(second.version, "2");
        assert_eq!(api.calls().create, 1);
        assert_eq!(api.calls().update, 1);
    }

    #[tokio::test]
    async fn apply_recreates_vanished_guardrail() {
        let dir = tempdir().unwrap();
        let store = HandleStore::new(dir.path()).unwrap();
        let (api, reconciler) = setup();

        let first = apply(&reconciler, &store, descriptor(), None).await.unwrap();
        api.remove_out_of_band(&first.remote_id);

        let second = apply(&reconciler, &store, descriptor(), None).await.unwrap();
        assert_ne!(first.remote_id, second.remote_id);
        assert_eq!(second.status, HandleStatus::Ready);
        assert_eq!(store.get("dev", "safety").unwrap(), Some(second));
    }

    #[tokio::test]
    async fn failed_update_records_failed_handle() {
        let dir = tempdir().unwrap();
        let store = HandleStore::new(dir.path()).unwrap();
        let (api, reconciler) = setup();
        create(&reconciler, &store, descriptor(), None).await.unwrap();

        api.fail_next(ReconcileError::Unknown("internal error".into()));
        let err = update(&reconciler, &store, descriptor(), None).await.unwrap_err();
        assert!(format!("{:#}", err).contains("non-retryable"));

        let stored = store.get("dev", "safety").unwrap().unwrap();
        assert_eq!(stored.status, HandleStatus::Failed);
        assert!(stored.last_error.is_some());
    }

    #[tokio::test]
    async fn delete_removes_handle_and_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = HandleStore::new(dir.path()).unwrap();
        let (api, reconciler) = setup();
        create(&reconciler, &store, descriptor(), None).await.unwrap();

        delete(&reconciler, &store, "dev", "safety", None).await.unwrap();
        assert!(store.get("dev", "safety").unwrap().is_none());
        assert!(api.is_empty());

        // No handle left: nothing to call.
        delete(&reconciler, &store, "dev", "safety", None).await.unwrap();
        assert_eq!(api.calls().delete, 1);
    }

    #[tokio::test]
    async fn apply_all_checks_every_file_before_touching_the_remote() {
        let dir = tempdir().unwrap();
        let store = Arc::new(HandleStore::new(dir.path().join("handles")).unwrap());
        let api = Arc::new(InMemoryGuardrailApi::new());
        let reconciler = Arc::new(SerializedReconciler::new(Reconciler::new(api.clone())));

        let good = dir.path().join("good.yaml");
        std::fs::write(&good, "name: safety\nenvironment: dev\nblocked_terms: [hack]\n").unwrap();
        let empty = dir.path().join("empty.yaml");
        std::fs::write(&empty, "name: empty\nenvironment: dev\n").unwrap();
        let missing = dir.path().join("missing.yaml");

        let files = vec![good.clone(), empty, missing];
        let err = apply_all(reconciler.clone(), store.clone(), &files, None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("2 of 3 descriptors are invalid"));
        assert_eq!(api.calls().mutating(), 0);
        assert!(store.list().unwrap().is_empty());

        apply_all(reconciler, store.clone(), &[good], None).await.unwrap();
        assert_eq!(api.calls().create, 1);
        assert!(store.get("dev", "safety").unwrap().is_some());
    }

    #[tokio::test]
    async fn update_without_handle_is_rejected() {
        let dir = tempdir().unwrap();
        let store = HandleStore::new(dir.path()).unwrap();
        let (api, reconciler) = setup();

        let err = update(&reconciler, &store, descriptor(), None).await.unwrap_err();
        assert!(err.to_string().contains("create it first"));
        assert_eq!(api.calls().mutating(), 0);
    }
}
