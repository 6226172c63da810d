//! Fakes and a harness shared by the unit tests.

use std::{
    path::PathBuf,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicU16, AtomicU64, AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use camrelay_model::{RunState, Target};
use tokio_util::sync::CancellationToken;

use crate::{
    config::RelayConfig,
    context::{Collaborators, RelayContext},
    error::{FetchError, NotifyError, ResolveError},
    ports::{Fetched, Notifier, Session, SessionFactory, SourceResolver},
    scheduler,
    state::{FileBackend, OverrideBackend, RunStateStore, StateBackend},
    system::MemoryProbe,
};

/// Lets spawned tasks run without moving the (paused) clock.
pub async fn settle() {
    for _ in 0..64 {
        tokio::task::yield_now().await;
    }
}

pub fn temp_state_path() -> PathBuf {
    std::env::temp_dir().join(format!("camrelay-test-{}.json", uuid::Uuid::new_v4()))
}

pub fn test_config() -> RelayConfig {
    RelayConfig {
        page_ref: "http://cams.test/page".to_string(),
        default_url: "http://cams.test/default.jpg".to_string(),
        default_label: "default".to_string(),
        ..RelayConfig::default()
    }
}

#[derive(Default)]
pub struct FakeNotifier {
    messages: Mutex<Vec<String>>,
    photos: Mutex<Vec<(usize, String)>>,
    fail: AtomicBool,
}

impl FakeNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail(&self, on: bool) {
        self.fail.store(on, Ordering::SeqCst);
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }

    /// `(byte count, caption)` per published image.
    pub fn photos(&self) -> Vec<(usize, String)> {
        self.photos.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for FakeNotifier {
    async fn publish(&self, bytes: Vec<u8>, caption: &str) -> Result<(), NotifyError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(NotifyError::Rejected { status: 500 });
        }
        self.photos.lock().unwrap().push((bytes.len(), caption.to_string()));
        Ok(())
    }

    async fn message(&self, text: &str) -> Result<(), NotifyError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(NotifyError::Transport("offline".into()));
        }
        self.messages.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

/// Resolves to `http://cams.test/live.jpg` labelled `harbour`.
#[derive(Default)]
pub struct FakeResolver {
    failures_left: AtomicUsize,
    calls: AtomicUsize,
}

impl FakeResolver {
    pub fn fail_next(&self, n: usize) {
        self.failures_left.store(n, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceResolver for FakeResolver {
    async fn resolve(&self, page_ref: &str) -> Result<Target, ResolveError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let left = self.failures_left.load(Ordering::SeqCst);
        if left > 0 {
            self.failures_left.store(left - 1, Ordering::SeqCst);
            return Err(ResolveError::Missing(page_ref.to_string()));
        }
        Ok(Target::resolved("http://cams.test/live.jpg", "harbour"))
    }
}

/// Session factory whose sessions answer every GET with one shared status.
pub struct FakeSessions {
    status: Arc<AtomicU16>,
    gets: Arc<Mutex<Vec<String>>>,
    closes: Arc<AtomicUsize>,
    opens: AtomicUsize,
    fail_open: AtomicBool,
    slow_open: AtomicBool,
}

impl FakeSessions {
    pub fn new(status: u16) -> Arc<Self> {
        Arc::new(Self {
            status: Arc::new(AtomicU16::new(status)),
            gets: Arc::default(),
            closes: Arc::default(),
            opens: AtomicUsize::new(0),
            fail_open: AtomicBool::new(false),
            slow_open: AtomicBool::new(false),
        })
    }

    pub fn set_status(&self, status: u16) {
        self.status.store(status, Ordering::SeqCst);
    }

    pub fn gets(&self) -> Vec<String> {
        self.gets.lock().unwrap().clone()
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn fail_open(&self, on: bool) {
        self.fail_open.store(on, Ordering::SeqCst);
    }

    /// Makes `open` yield once before returning.
    pub fn slow_open(&self, on: bool) {
        self.slow_open.store(on, Ordering::SeqCst);
    }
}

#[async_trait]
impl SessionFactory for FakeSessions {
    async fn open(&self) -> Result<Arc<dyn Session>, FetchError> {
        if self.slow_open.load(Ordering::SeqCst) {
            tokio::task::yield_now().await;
        }
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(FetchError::Session("refused".into()));
        }
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(FakeSession {
            status: Arc::clone(&self.status),
            gets: Arc::clone(&self.gets),
            closes: Arc::clone(&self.closes),
        }))
    }
}

struct FakeSession {
    status: Arc<AtomicU16>,
    gets: Arc<Mutex<Vec<String>>>,
    closes: Arc<AtomicUsize>,
}

#[async_trait]
impl Session for FakeSession {
    async fn get(&self, url: &str) -> Result<Fetched, FetchError> {
        self.gets.lock().unwrap().push(url.to_string());
        if url.contains("blackhole") {
            std::future::pending::<()>().await;
        }
        Ok(Fetched {
            status: self.status.load(Ordering::SeqCst),
            body: vec![0xFF, 0xD8, 0xFF, 0xE0],
        })
    }

    async fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Memory probe reporting a settable value (0 reads as unavailable).
#[derive(Default)]
pub struct FakeMemory {
    bytes: AtomicU64,
    reads: AtomicUsize,
    panics: AtomicBool,
}

impl FakeMemory {
    pub fn set(&self, bytes: u64) {
        self.bytes.store(bytes, Ordering::SeqCst);
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Makes every read panic after it is counted.
    pub fn panic_on_read(&self, on: bool) {
        self.panics.store(on, Ordering::SeqCst);
    }
}

impl MemoryProbe for FakeMemory {
    fn resident_bytes(&self) -> Option<u64> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.panics.load(Ordering::SeqCst) {
            panic!("memory probe failed");
        }
        match self.bytes.load(Ordering::SeqCst) {
            0 => None,
            n => Some(n),
        }
    }
}

/// A loaded store, a running inbox and a context wired to fakes.
pub struct Harness {
    pub ctx: Arc<RelayContext>,
    pub notifier: Arc<FakeNotifier>,
    pub resolver: Arc<FakeResolver>,
    pub sessions: Arc<FakeSessions>,
    pub memory: Arc<FakeMemory>,
    pub state_path: PathBuf,
    inbox: CancellationToken,
}

impl Harness {
    /// Nothing persisted, so the store loads `running = true`.
    pub async fn running(cfg: RelayConfig) -> Self {
        Self::build(cfg, None).await
    }

    /// Seeded with an override of `running = false`.
    pub async fn stopped(cfg: RelayConfig) -> Self {
        Self::build(cfg, Some(false)).await
    }

    async fn build(cfg: RelayConfig, seed: Option<bool>) -> Self {
        let notifier = FakeNotifier::new();
        let resolver = Arc::new(FakeResolver::default());
        let sessions = FakeSessions::new(200);
        let memory = Arc::new(FakeMemory::default());
        let state_path = temp_state_path();

        let store = RunStateStore::new(vec![
            Box::new(OverrideBackend::in_memory(seed)),
            Box::new(FileBackend::new(&state_path)),
        ])
        .with_notifier(notifier.clone(), cfg.call_timeout);
        store.load();

        let (scheduler, inbox) = scheduler::channel();
        let token = CancellationToken::new();
        tokio::spawn(inbox.run(token.clone()));

        let ctx = RelayContext::new(
            cfg,
            Arc::new(store),
            scheduler,
            Collaborators {
                resolver: resolver.clone(),
                notifier: notifier.clone(),
                sessions: sessions.clone(),
                memory: memory.clone(),
            },
        )
        .await
        .unwrap();

        Self {
            ctx,
            notifier,
            resolver,
            sessions,
            memory,
            state_path,
            inbox: token,
        }
    }

    /// Stops the scheduler inbox; later submissions fail with `Closed`.
    pub async fn close_inbox(&self) {
        self.inbox.cancel();
        settle().await;
    }

    /// What the file backend currently holds.
    pub fn file_state(&self) -> Option<RunState> {
        FileBackend::new(&self.state_path).load().unwrap()
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.inbox.cancel();
        let _ = std::fs::remove_file(&self.state_path);
    }
}
