use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use harvest_core::config::CrawlSettings;
use harvest_core::error::{Error, NetworkError, Result};
use harvest_core::request::{FetchMode, Request};
use harvest_core::response::FetchResult;
use tokio::sync::Mutex;

use crate::*;

/// Records hook invocations into a shared log
struct Recorder {
    name: String,
    log: Arc<Mutex<Vec<String>>>,
}

#[harvest_core::async_trait]
impl Middleware for Recorder {
    fn name(&self) -> &str {
        &self.name
    }

    async fn before_request(&self, request: Request, _settings: &CrawlSettings) -> Result<Request> {
        self.log.lock().await.push(format!("before:{}", self.name));
        Ok(request.with_header(format!("X-{}", self.name), "1"))
    }

    async fn after_response(
        &self,
        response: FetchResult,
        _request: &Request,
        _settings: &CrawlSettings,
    ) -> Result<FetchResult> {
        self.log.lock().await.push(format!("after:{}", self.name));
        Ok(response)
    }

    async fn on_error(&self, _request: &Request, _error: &Error, _settings: &CrawlSettings) {
        self.log.lock().await.push(format!("error:{}", self.name));
    }
}

fn response(request: &Request, status: u16) -> FetchResult {
    FetchResult::new(request.url.clone(), status, HashMap::new(), Vec::new(), FetchMode::Http)
}

fn no_delay() -> CrawlSettings {
    CrawlSettings::default().with_delay(Duration::ZERO)
}

#[tokio::test]
async fn test_chain_is_onion_ordered() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut chain = MiddlewareChain::new();
    for name in ["a", "b", "c"] {
        chain.add(Recorder {
            name: name.to_string(),
            log: Arc::clone(&log),
        });
    }
    assert_eq!(chain.names(), vec!["a", "b", "c"]);

    let settings = no_delay();
    let request = chain
        .before_request(Request::get("http://a.test/").unwrap(), &settings)
        .await
        .unwrap();
    assert!(request.has_header("X-a") && request.has_header("X-c"));

    let res = response(&request, 200);
    chain.after_response(res, &request, &settings).await.unwrap();

    let err = Error::fetch("http://a.test/", NetworkError::ConnectionReset);
    chain.on_error(&request, &err, &settings).await;

    assert_eq!(
        *log.lock().await,
        vec![
            "before:a", "before:b", "before:c", "after:c", "after:b", "after:a", "error:c",
            "error:b", "error:a"
        ]
    );
}

#[tokio::test]
async fn test_default_headers_do_not_override() {
    let middleware = DefaultHeadersMiddleware::common().with_header("X-Test", "default");
    let request = Request::get("http://a.test/")
        .unwrap()
        .with_header("accept", "application/json");

    let request = middleware.before_request(request, &no_delay()).await.unwrap();
    assert_eq!(request.header("Accept"), Some("application/json"));
    assert_eq!(request.header("X-Test"), Some("default"));
    assert!(request.has_header("Accept-Language"));
}

#[tokio::test]
async fn test_with_headers_replaces_defaults_case_insensitively() {
    let mut custom = HashMap::new();
    custom.insert("accept-language".to_string(), "de".to_string());
    let middleware = DefaultHeadersMiddleware::common().with_headers(custom);

    let request = middleware
        .before_request(Request::get("http://a.test/").unwrap(), &no_delay())
        .await
        .unwrap();
    assert_eq!(request.header("Accept-Language"), Some("de"));
    assert_eq!(request.headers.len(), 2);
}

#[tokio::test]
async fn test_user_agent_rotation() {
    let pool = vec!["ua-1".to_string(), "ua-2".to_string()];
    let middleware = UserAgentMiddleware::rotating(pool.clone());
    for _ in 0..10 {
        let request = middleware
            .before_request(Request::get("http://a.test/").unwrap(), &no_delay())
            .await
            .unwrap();
        let ua = request.header("User-Agent").unwrap().to_string();
        assert!(pool.contains(&ua));
    }

    let fixed = UserAgentMiddleware::fixed("mine");
    let request = Request::get("http://a.test/").unwrap().with_header("User-Agent", "explicit");
    let request = fixed.before_request(request, &no_delay()).await.unwrap();
    assert_eq!(request.header("user-agent"), Some("explicit"));
}

#[tokio::test]
async fn test_from_settings_chain_layout() {
    let mut settings = CrawlSettings::default();
    assert_eq!(
        MiddlewareChain::from_settings(&settings).names(),
        vec![
            "DefaultHeadersMiddleware",
            "UserAgentMiddleware",
            "ResponseLoggerMiddleware",
            "RateLimitMiddleware"
        ]
    );

    settings.proxies = vec!["http://p1:8080".into()];
    settings.log_requests = false;
    assert_eq!(
        MiddlewareChain::from_settings(&settings).names(),
        vec![
            "DefaultHeadersMiddleware",
            "UserAgentMiddleware",
            "ProxyRotationMiddleware",
            "RateLimitMiddleware"
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_serializes_same_host() {
    let limiter = RateLimitMiddleware::new();
    let settings = CrawlSettings::default().with_delay(Duration::from_secs(1));

    let start = tokio::time::Instant::now();
    for i in 0..4 {
        let request = Request::get(format!("http://a.test/{}", i)).unwrap();
        limiter.before_request(request, &settings).await.unwrap();
    }
    assert!(start.elapsed() >= Duration::from_secs(3));
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_does_not_serialize_distinct_hosts() {
    let limiter = Arc::new(RateLimitMiddleware::new());
    let settings = Arc::new(CrawlSettings::default().with_delay(Duration::from_secs(5)));

    // Prime both hosts so the next request to each must wait
    for host in ["a.test", "b.test"] {
        let request = Request::get(format!("http://{}/", host)).unwrap();
        limiter.before_request(request, &settings).await.unwrap();
    }

    let start = tokio::time::Instant::now();
    let tasks: Vec<_> = ["a.test", "b.test"]
        .into_iter()
        .map(|host| {
            let limiter = Arc::clone(&limiter);
            let settings = Arc::clone(&settings);
            tokio::spawn(async move {
                let request = Request::get(format!("http://{}/next", host)).unwrap();
                limiter.before_request(request, &settings).await.unwrap();
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }

    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_secs(5));
    assert!(elapsed < Duration::from_secs(10));
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_backs_off_on_429_and_resets() {
    let limiter = RateLimitMiddleware::new();
    let settings = CrawlSettings::default().with_delay(Duration::from_secs(1));
    let request = Request::get("http://a.test/").unwrap();

    let base = limiter.current_delay(&request.url, &settings).await;
    assert_eq!(base, Duration::from_secs(1));

    limiter
        .after_response(response(&request, 429), &request, &settings)
        .await
        .unwrap();
    let slowed = limiter.current_delay(&request.url, &settings).await;
    assert!(slowed > base);
    assert!(slowed <= settings.max_delay());

    limiter
        .after_response(response(&request, 200), &request, &settings)
        .await
        .unwrap();
    assert_eq!(limiter.current_delay(&request.url, &settings).await, base);
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_honours_retry_after() {
    let limiter = RateLimitMiddleware::new();
    let settings = CrawlSettings::default().with_delay(Duration::from_secs(1));
    let request = Request::get("http://a.test/").unwrap();

    let mut headers = HashMap::new();
    headers.insert("Retry-After".to_string(), "30".to_string());
    let res = FetchResult::new(request.url.clone(), 429, headers, Vec::new(), FetchMode::Http);
    limiter.after_response(res, &request, &settings).await.unwrap();

    assert!(limiter.current_delay(&request.url, &settings).await >= Duration::from_secs(30));
}

#[tokio::test(start_paused = true)]
async fn test_proxy_round_robin_and_demotion() {
    let proxies = vec!["http://p1:1".to_string(), "http://p2:1".to_string()];
    let middleware = ProxyRotationMiddleware::new(proxies, ProxyStrategy::RoundRobin)
        .with_max_failures(2)
        .with_cooldown(Duration::from_secs(60));

    assert_eq!(middleware.select().await.as_deref(), Some("http://p1:1"));
    assert_eq!(middleware.select().await.as_deref(), Some("http://p2:1"));
    assert_eq!(middleware.select().await.as_deref(), Some("http://p1:1"));

    middleware.report_failure("http://p1:1").await;
    middleware.report_failure("http://p1:1").await;

    for _ in 0..3 {
        assert_eq!(middleware.select().await.as_deref(), Some("http://p2:1"));
    }
    let stats = middleware.stats().await;
    assert!(!stats[0].available);
    assert_eq!(stats[0].total_failures, 2);

    tokio::time::advance(Duration::from_secs(61)).await;
    let picks: Vec<_> = [middleware.select().await, middleware.select().await]
        .into_iter()
        .flatten()
        .collect();
    assert!(picks.contains(&"http://p1:1".to_string()));
}

#[tokio::test(start_paused = true)]
async fn test_proxy_all_demoted_uses_least_recently_failed() {
    let proxies = vec!["http://p1:1".to_string(), "http://p2:1".to_string()];
    let middleware = ProxyRotationMiddleware::new(proxies, ProxyStrategy::LeastRecentlyFailed)
        .with_max_failures(1);

    middleware.report_failure("http://p1:1").await;
    tokio::time::advance(Duration::from_secs(1)).await;
    middleware.report_failure("http://p2:1").await;

    assert_eq!(middleware.select().await.as_deref(), Some("http://p1:1"));
}

#[tokio::test]
async fn test_proxy_middleware_hooks() {
    let middleware = ProxyRotationMiddleware::new(vec!["http://p1:1".into()], ProxyStrategy::RoundRobin)
        .with_max_failures(1);
    let settings = no_delay();

    let request = middleware
        .before_request(Request::get("http://a.test/").unwrap(), &settings)
        .await
        .unwrap();
    assert_eq!(request.proxy.as_deref(), Some("http://p1:1"));

    // Non-connection failures do not count against the proxy
    let err = Error::fetch("http://a.test/", NetworkError::TooManyRedirects);
    middleware.on_error(&request, &err, &settings).await;
    assert!(middleware.stats().await[0].available);

    let err = Error::fetch("http://a.test/", NetworkError::ConnectionRefused);
    middleware.on_error(&request, &err, &settings).await;
    assert!(!middleware.stats().await[0].available);
}
