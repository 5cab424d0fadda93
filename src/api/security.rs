use super::*;

pub(super) const DEFAULT_RATE_LIMIT_PER_SEC: u32 = 60;

/// Optional bearer-token auth plus per-IP rate limiting. The brain is
/// usually exposed through a public tunnel while streaming, so the
/// token is strongly recommended outside local testing.
#[derive(Clone)]
pub struct ApiSecurity {
    pub(super) required_token: Option<String>,
    pub(super) rate_limit_per_sec: u32,
    pub(super) buckets: Arc<Mutex<HashMap<String, RateBucket>>>,
}

#[derive(Clone)]
pub(super) struct RateBucket {
    pub window_start: std::time::Instant,
    pub count: u32,
}

impl ApiSecurity {
    pub fn from_env() -> Self {
        let required_token = std::env::var("CHAOS_API_TOKEN")
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());
        let rate_limit_per_sec = std::env::var("CHAOS_API_RATE_LIMIT_PER_SEC")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(DEFAULT_RATE_LIMIT_PER_SEC)
            .max(1);
        Self::new(required_token, rate_limit_per_sec)
    }

    pub fn new(required_token: Option<String>, rate_limit_per_sec: u32) -> Self {
        Self {
            required_token,
            rate_limit_per_sec,
            buckets: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

fn token_matches(req: &Request, expected: &str) -> bool {
    let header = |name: &str| {
        req.headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .unwrap_or("")
    };
    let auth = header("authorization");
    let bearer = auth
        .strip_prefix("Bearer ")
        .or_else(|| auth.strip_prefix("bearer "))
        .unwrap_or(auth);
    bearer == expected || header("x-api-key") == expected
}

pub(super) async fn api_guard(
    State(security): State<ApiSecurity>,
    req: Request,
    next: Next,
) -> axum::response::Response {
    if let Some(expected) = security.required_token.as_deref() {
        if !token_matches(&req, expected) {
            return (
                StatusCode::UNAUTHORIZED,
                Json(ApiResponse::err(
                    "Unauthorized: set CHAOS_API_TOKEN and send Authorization: Bearer <token>",
                )),
            )
                .into_response();
        }
    }

    let key = req
        .headers()
        .get("x-forwarded-for")
        .or_else(|| req.headers().get("x-real-ip"))
        .and_then(|v| v.to_str().ok())
        .unwrap_or("local")
        .to_string();

    {
        let mut buckets = security.buckets.lock().unwrap();
        let now = std::time::Instant::now();
        let bucket = buckets.entry(key).or_insert(RateBucket {
            window_start: now,
            count: 0,
        });
        if now.duration_since(bucket.window_start).as_secs_f32() >= 1.0 {
            bucket.window_start = now;
            bucket.count = 0;
        }
        bucket.count = bucket.count.saturating_add(1);
        if bucket.count > security.rate_limit_per_sec {
            return (
                StatusCode::TOO_MANY_REQUESTS,
                Json(ApiResponse::err("Rate limit exceeded")),
            )
                .into_response();
        }

        if buckets.len() > 4096 {
            buckets.retain(|_, b| now.duration_since(b.window_start).as_secs_f32() < 10.0);
        }
    }

    next.run(req).await
}
