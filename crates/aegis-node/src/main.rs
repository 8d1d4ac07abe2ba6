//! aegis-node — the Aegis trust-and-attestation node binary.
//!
//! Startup sequence:
//!   1. Load configuration from the environment
//!   2. Open (or initialise) the state database
//!   3. Bootstrap the session secret and TEE trust roots
//!   4. Wire the engines: challenges, verifier, registry, attestations, auth
//!   5. Start the JSON-RPC 2.0 server
//!   6. Run background reapers: challenges, replay marks, orphan blobs

use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};

use aegis_attest::{AttestationEngine, SchemaRegistry};
use aegis_auth::SessionAuth;
use aegis_core::config::Config;
use aegis_registry::{AccountDirectory, DeviceRegistry};
use aegis_rpc::limit::RateLimiter;
use aegis_rpc::{RpcServer, RpcServerState};
use aegis_store::{AnchorLog, BlobStore, SledAnchorLog, SledBlobStore, StateDb};
use aegis_tee::{ChallengeStore, TeeVerifier, TrustedRoots};

#[derive(Parser, Debug)]
#[command(
    name = "aegis-node",
    version,
    about = "Aegis node — encrypted attestations, device trust, humanity scoring"
)]
struct Args {
    /// Directory for the persistent state database.
    #[arg(long, default_value = "~/.aegis/data")]
    data_dir: PathBuf,

    /// JSON-RPC listen address.
    #[arg(long, default_value = "127.0.0.1:8645")]
    rpc_addr: SocketAddr,

    /// Interval between background reaper sweeps, in seconds.
    #[arg(long, default_value_t = 60)]
    reaper_interval_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,aegis=debug".parse().unwrap()),
        )
        .init();

    let args = Args::parse();
    let config = Config::from_env();
    info!("Aegis node starting");
    if config.tee_demo_mode {
        warn!("TEE_DEMO_MODE is enabled — quotes are NOT cryptographically verified");
    }

    // ── State database ────────────────────────────────────────────────────────
    let data_dir = expand_tilde(&args.data_dir);
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("creating data dir {}", data_dir.display()))?;
    let db = Arc::new(StateDb::open(&data_dir).context("opening state database")?);

    // ── TEE trust roots ───────────────────────────────────────────────────────
    let roots = match &config.trusted_tee_roots {
        Some(path) => TrustedRoots::load(path)
            .with_context(|| format!("loading TEE roots from {}", path.display()))?,
        None => {
            if !config.tee_demo_mode {
                warn!("TRUSTED_TEE_ROOTS not set — every real quote will fail its chain check");
            }
            TrustedRoots::default()
        }
    };

    // ── Engines ───────────────────────────────────────────────────────────────
    let blobs = Arc::new(SledBlobStore::new(Arc::clone(&db), config.max_blob_size));
    let anchors = Arc::new(SledAnchorLog::new(Arc::clone(&db)));
    let challenges = Arc::new(ChallengeStore::new(Arc::clone(&db), config.challenge_ttl));
    let verifier = Arc::new(TeeVerifier::new(
        Arc::clone(&db),
        Arc::clone(&challenges),
        roots,
        &config,
    ));

    let state = Arc::new(RpcServerState {
        auth: SessionAuth::open(Arc::clone(&db), Arc::clone(&challenges), &config)
            .context("opening session auth")?,
        schemas: SchemaRegistry::new(Arc::clone(&db)),
        engine: AttestationEngine::new(
            Arc::clone(&db),
            Arc::clone(&blobs) as Arc<dyn BlobStore>,
            Arc::clone(&anchors) as Arc<dyn AnchorLog>,
            config.max_recipients,
            config.max_plaintext_size(),
        ),
        registry: DeviceRegistry::new(Arc::clone(&db), Arc::clone(&verifier), &config),
        directory: AccountDirectory::new(Arc::clone(&db), &config),
        verifier: Arc::clone(&verifier),
        limiter: RateLimiter::new(config.rate_limit_per_minute),
        config,
    });

    // ── Background reapers ────────────────────────────────────────────────────
    let reaper_state = Arc::clone(&state);
    let reaper_db = Arc::clone(&db);
    let reaper_verifier = Arc::clone(&verifier);
    let reaper_challenges = Arc::clone(&challenges);
    let interval = Duration::from_secs(args.reaper_interval_secs.max(1));
    tokio::spawn(async move {
        let mut orphans = OrphanSweeper::default();
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let now = chrono::Utc::now().timestamp();
            match reaper_challenges.sweep(now) {
                Ok(n) if n > 0 => info!(evicted = n, "expired challenges reaped"),
                Ok(_) => {}
                Err(e) => warn!(error = %e, "challenge sweep failed"),
            }
            match reaper_verifier.sweep_replay_marks(now) {
                Ok(n) if n > 0 => info!(evicted = n, "expired replay marks reaped"),
                Ok(_) => {}
                Err(e) => warn!(error = %e, "replay sweep failed"),
            }
            if let Err(e) = orphans.sweep(&reaper_db) {
                warn!(error = %e, "orphan blob sweep failed");
            }
            reaper_state.limiter.sweep();
        }
    });

    // ── RPC server ────────────────────────────────────────────────────────────
    let rpc_handle = RpcServer::new(state)
        .start(args.rpc_addr)
        .await
        .context("starting RPC server")?;

    info!("node ready");
    tokio::signal::ctrl_c().await.context("waiting for shutdown signal")?;
    info!("shutting down");
    let _ = rpc_handle.stop();
    db.flush().context("flushing state database")?;
    Ok(())
}

/// Removes blobs that no anchor references and no pin protects.
///
/// A blob seen unreferenced in two consecutive sweeps is removed; the first
/// sighting only marks it as a candidate, which gives an in-flight create a
/// full sweep interval to append its anchor.
#[derive(Default)]
struct OrphanSweeper {
    candidates: HashSet<[u8; 32]>,
}

impl OrphanSweeper {
    fn sweep(&mut self, db: &StateDb) -> Result<(), aegis_core::error::AegisError> {
        let referenced = db.referenced_blob_ids()?;
        let mut next_candidates = HashSet::new();
        let mut removed = 0usize;

        for blob_id in db.iter_blob_ids()? {
            let raw = *blob_id.as_bytes();
            if referenced.contains(&raw) || db.blob_pinned(&blob_id) {
                continue;
            }
            if self.candidates.contains(&raw) {
                db.remove_blob(&blob_id)?;
                removed += 1;
            } else {
                next_candidates.insert(raw);
            }
        }

        if removed > 0 {
            info!(removed, "orphan blobs reclaimed");
        }
        self.candidates = next_candidates;
        Ok(())
    }
}

/// Expand a leading `~` to the user's home directory (`HOME` or `USERPROFILE`).
fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Ok(home) = std::env::var("HOME").or_else(|_| std::env::var("USERPROFILE")) {
            return PathBuf::from(home).join(stripped);
        }
    }
    path.to_path_buf()
}
