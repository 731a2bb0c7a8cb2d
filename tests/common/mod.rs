//! Shared utilities for integration testing.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use admin_console::config::ConsoleConfig;
use admin_console::lifecycle::{AdminWatchdog, Console, Shutdown};
use admin_console::store::UserRepository;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

#[allow(dead_code)]
pub const API_KEY: &str = "test-api-key";

/// A console served on an ephemeral port with a recording termination hook.
#[allow(dead_code)]
pub struct TestConsole {
    pub base_url: String,
    pub shutdown: Shutdown,
    pub watchdog: Arc<AdminWatchdog>,
    pub users: UserRepository,
    pub terminations: Arc<AtomicUsize>,
    pub server: JoinHandle<()>,
}

#[allow(dead_code)]
impl TestConsole {
    pub fn terminations(&self) -> usize {
        self.terminations.load(Ordering::SeqCst)
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

pub fn test_config() -> ConsoleConfig {
    let mut config = ConsoleConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.admin.api_key = API_KEY.into();
    config.admin.init_timeout_secs = 300;
    config
}

/// Start a console and arm its watchdog the way `main` does.
pub async fn start_console(config: ConsoleConfig) -> TestConsole {
    let terminations = Arc::new(AtomicUsize::new(0));
    let hook = {
        let terminations = terminations.clone();
        Arc::new(move |_message: &str| {
            terminations.fetch_add(1, Ordering::SeqCst);
        })
    };

    let shutdown = Shutdown::new();
    let console = Console::bootstrap_with(config, shutdown.clone(), hook).unwrap();
    let watchdog = console.watchdog().clone();
    let users = console.users().clone();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();

    console.arm_watchdog().unwrap();
    let server = tokio::spawn(async move {
        console.serve(listener).await.unwrap();
    });

    TestConsole {
        base_url: format!("http://{}", addr),
        shutdown,
        watchdog,
        users,
        terminations,
        server,
    }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap()
}
