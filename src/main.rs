use std::{net::TcpListener, sync::Arc, time::Duration};

use env_logger::Env;
use prospect::{
    configuration::get_configuration,
    domain::{IdentityPool, ProxyPool, SearchQuery},
    services::{
        scrape_worker_handler, AntiBlockPolicy, HttpPageFetcher, PageFetcher, PgResultSink,
        RunSettings, ScrapeOrchestrator, ScrapeQuerySender, WebDriverFetcher,
    },
    startup::run,
};
use sqlx::postgres::PgPoolOptions;
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let configuration = get_configuration().expect("Failed to read configuration.");

    let pool_options = PgPoolOptions::new()
        .max_connections(20)
        .min_connections(5)
        .acquire_timeout(Duration::from_secs(10))
        .idle_timeout(Duration::from_secs(15 * 60)) // 15 minutes
        .max_lifetime(None);

    let connection_pool = pool_options.connect_lazy_with(configuration.database.with_db());
    let address = format!(
        "{}:{}",
        configuration.application.host, configuration.application.port
    );
    let listener = TcpListener::bind(address)?;

    let scraper = configuration.scraper;
    let identities = IdentityPool::new(scraper.identity_pool.clone(), scraper.use_builtin_agents)
        .expect("Invalid identity pool configuration.");
    let proxies = ProxyPool::new(scraper.proxy_pool.clone(), scraper.enable_proxy)
        .expect("Invalid proxy pool configuration.");
    let policy = AntiBlockPolicy::new(identities, proxies, scraper.delay_range_ms())
        .expect("Invalid delay configuration.");

    let fetcher: Arc<dyn PageFetcher> = match &scraper.webdriver_url {
        Some(url) => Arc::new(WebDriverFetcher::new(url.clone())),
        None => Arc::new(HttpPageFetcher::new()),
    };
    let sink = Arc::new(PgResultSink::new(connection_pool.clone()));

    let orchestrator = Arc::new(ScrapeOrchestrator::new(
        Arc::new(policy),
        fetcher,
        sink,
        RunSettings {
            max_attempts: scraper.max_attempts,
            fetch_timeout: scraper.fetch_timeout(),
        },
    ));

    let (query_sender, query_receiver) = mpsc::unbounded_channel::<SearchQuery>();
    let query_sender = ScrapeQuerySender {
        sender: query_sender,
    };

    // Spawn backgound tasks
    let pool_clone = connection_pool.clone();
    tokio::spawn(async move { scrape_worker_handler(query_receiver, orchestrator, pool_clone).await });

    run(listener, connection_pool, query_sender)?.await
}
