use axum::{
    extract::{DefaultBodyLimit, FromRef},
    http::{header, HeaderValue, Method, Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Router,
};
use mongodb::options::ClientOptions;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    services::ServeDir,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::{
    api::{
        appointment::{self, AppointmentModel},
        auth, doctor,
        message::{self, MessageModel},
        session::CookieSettings,
        token::TokenService,
        user::UserModel,
    },
    config::AppConfig,
    error::Error,
    image::{ImageStore, LocalImageHost},
    mongo_ext::Collection,
    store::{memory::MemoryCollection, AppointmentCollection, MessageCollection, UserCollection},
};

/// Doctor avatars travel in the multipart body.
const DOCTOR_FORM_LIMIT: usize = 5 * 1024 * 1024;

#[derive(FromRef, Clone)]
pub struct AppState {
    pub argon: argon2::Argon2<'static>,
    pub tokens: TokenService,
    pub cookies: CookieSettings,

    pub users: UserCollection,
    pub appointments: AppointmentCollection,
    pub messages: MessageCollection,
    pub images: ImageStore,
}

impl AppState {
    pub fn new(
        config: &AppConfig,
        users: UserCollection,
        appointments: AppointmentCollection,
        messages: MessageCollection,
        images: ImageStore,
    ) -> Self {
        Self {
            argon: argon2::Argon2::default(),
            tokens: TokenService::from_config(config),
            cookies: CookieSettings::from_config(config),

            users,
            appointments,
            messages,
            images,
        }
    }

    pub async fn connect(config: &AppConfig, mongo_url: &str) -> Result<Self, Error> {
        let options = ClientOptions::parse(mongo_url).await?;
        let client = mongodb::Client::with_options(options)?;
        let db = client.database(&config.mongo_database);

        crate::migrate::run_migration(&db).await?;

        Ok(Self::new(
            config,
            UserCollection::new(Collection::from(db.collection::<UserModel>("users"))),
            AppointmentCollection::new(Collection::from(
                db.collection::<AppointmentModel>("appointments"),
            )),
            MessageCollection::new(Collection::from(
                db.collection::<MessageModel>("messages"),
            )),
            local_images(config),
        ))
    }

    pub fn in_memory(config: &AppConfig) -> Self {
        Self::new(
            config,
            UserCollection::new(MemoryCollection::<UserModel>::default()),
            AppointmentCollection::new(MemoryCollection::<AppointmentModel>::default()),
            MessageCollection::new(MemoryCollection::<MessageModel>::default()),
            local_images(config),
        )
    }

    pub async fn from_config(config: &AppConfig) -> Result<Self, Error> {
        match &config.mongo_uri {
            Some(url) => Self::connect(config, url).await,
            None => {
                tracing::warn!("MONGO_URI is not set, data lives in memory only");
                Ok(Self::in_memory(config))
            }
        }
    }
}

fn local_images(config: &AppConfig) -> ImageStore {
    ImageStore::new(LocalImageHost::new(
        config.upload_dir.clone(),
        config.upload_public_url.clone(),
    ))
}

fn cors(config: &AppConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|it| {
            HeaderValue::from_str(it)
                .map_err(|_| tracing::warn!("ignoring invalid origin {}", it))
                .ok()
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE])
        .allow_credentials(true)
}

async fn fallback() -> Error {
    Error::NotFound("route")
}

/// Gives router and timeout rejections the same JSON body as handler errors.
async fn json_errors<B>(request: Request<B>, next: Next<B>) -> Response {
    let response = next.run(request).await;

    let is_json = response
        .headers()
        .get(header::CONTENT_TYPE)
        .map(|it| it.as_bytes().starts_with(b"application/json"))
        .unwrap_or(false);
    if is_json {
        return response;
    }

    let err = match response.status() {
        StatusCode::NOT_FOUND => Error::NotFound("route"),
        StatusCode::METHOD_NOT_ALLOWED => Error::MethodNotAllowed,
        StatusCode::REQUEST_TIMEOUT => Error::RequestTimeout,
        _ => return response,
    };

    let allow = response.headers().get(header::ALLOW).cloned();
    let mut replaced = err.into_response();
    if let Some(allow) = allow {
        replaced.headers_mut().insert(header::ALLOW, allow);
    }
    replaced
}

pub fn router(state: AppState, config: &AppConfig) -> Router {
    let api = Router::<AppState>::new()
        .route("/patient/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/admin/addnew", post(auth::add_admin))
        .route(
            "/doctor/addnew",
            post(doctor::add_doctor).layer(DefaultBodyLimit::max(DOCTOR_FORM_LIMIT)),
        )
        .route("/doctors", get(doctor::list_doctors))
        .route("/patient/me", get(auth::patient_me))
        .route("/admin/me", get(auth::admin_me))
        .route("/patient/logout", get(auth::patient_logout))
        .route("/admin/logout", get(auth::admin_logout))
        .nest(
            "/message",
            Router::new()
                .route("/send-message", post(message::send_message))
                .route("/getall", post(message::list_messages)),
        )
        .nest(
            "/appointment",
            Router::new()
                .route("/post", post(appointment::book_appointment))
                .route("/getall", get(appointment::list_appointments))
                .route("/update/:id", put(appointment::update_status))
                .route("/delete/:id", delete(appointment::delete_appointment)),
        );

    Router::new()
        .nest("/api", api)
        .nest_service("/uploads", ServeDir::new(&config.upload_dir))
        .fallback(fallback)
        .with_state(state)
        .layer(cors(config))
        .layer(TimeoutLayer::new(config.request_timeout))
        .layer(middleware::from_fn(json_errors))
        .layer(TraceLayer::new_for_http())
}
