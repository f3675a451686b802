use std::sync::{Arc, Mutex};

use rocket::{
    State,
    figment::Figment,
    get,
    http::Status,
    launch,
    request::{FromRequest, Outcome},
    routes,
    serde::json::Json,
};
use system_monitor::{
    collector::{LiveMetrics, SysinfoProbe},
    config::Config,
    remote::API_KEY_HEADER,
    util::{api_key_matches, get_addr, get_api_key, get_port},
};
use tracing::{error, instrument};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

struct AgentProbe(Arc<Mutex<SysinfoProbe>>);

#[get("/api/metrics")]
#[instrument(skip_all)]
async fn metrics(_key: ApiKey, probe: &State<AgentProbe>) -> Result<Json<LiveMetrics>, Status> {
    let probe = probe.0.clone();

    let sampled = rocket::tokio::task::spawn_blocking(move || {
        let mut probe = probe
            .lock()
            .map_err(|_| anyhow::anyhow!("host probe lock poisoned"))?;
        LiveMetrics::sample(&mut *probe)
    })
    .await;

    match sampled {
        Ok(Ok(metrics)) => Ok(Json(metrics)),
        Ok(Err(e)) => {
            error!("failed to sample metrics: {e:#}");
            Err(Status::InternalServerError)
        }
        Err(e) => {
            error!("metrics task failed: {e}");
            Err(Status::InternalServerError)
        }
    }
}

#[get("/ping")]
fn ping() {}

fn init() {
    dotenv::dotenv().ok();

    let filter = filter::Targets::new()
        .with_target("agent", tracing::metadata::LevelFilter::DEBUG)
        .with_target("system_monitor", tracing::metadata::LevelFilter::DEBUG)
        .with_target("rocket", tracing::metadata::LevelFilter::INFO);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(true),
        )
        .with(filter)
        .init();
}

fn get_config() -> Figment {
    rocket::Config::figment()
        .merge(("port", get_port()))
        .merge(("address", get_addr()))
}

#[launch]
fn rocket() -> _ {
    init();
    let figment = get_config();
    let probe = SysinfoProbe::new(Config::default().temperature_sensors);

    rocket::custom(figment)
        .manage(AgentProbe(Arc::new(Mutex::new(probe))))
        .mount("/", routes![metrics, ping])
}

#[derive(Debug)]
struct ApiKey;

#[rocket::async_trait]
impl<'r> FromRequest<'r> for ApiKey {
    type Error = ();

    async fn from_request(
        request: &'r rocket::Request<'_>,
    ) -> rocket::request::Outcome<Self, Self::Error> {
        let presented = request.headers().get_one(API_KEY_HEADER);
        let expected = get_api_key();

        if api_key_matches(expected.as_deref(), presented) {
            Outcome::Success(ApiKey)
        } else {
            Outcome::Error((Status::Unauthorized, ()))
        }
    }
}
