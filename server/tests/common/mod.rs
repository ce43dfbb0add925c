#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, HeaderMap, Method, Request, StatusCode},
    Router,
};
use clinic::{
    api::user::{create_user, Gender, NewUser, Role, UserModel, UserRequest},
    app::{router, AppState},
    config::AppConfig,
};
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

pub const PASSWORD: &str = "password123";
pub const BOUNDARY: &str = "clinic-test-boundary";

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub uploads: TempDir,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl TestResponse {
    /// `name=value` of the first `Set-Cookie` header, ready for a `Cookie` header.
    pub fn cookie(&self) -> String {
        self.headers
            .get(header::SET_COOKIE)
            .and_then(|it| it.to_str().ok())
            .and_then(|it| it.split(';').next())
            .unwrap_or_default()
            .to_string()
    }
}

pub async fn spawn() -> TestApp {
    let uploads = tempfile::tempdir().unwrap();
    let upload_dir = uploads.path().to_string_lossy().into_owned();

    let config = AppConfig::from_lookup(|key| match key {
        "PATIENT_JWT_SECRET" => Some("patient-integration-secret".to_string()),
        "ADMIN_JWT_SECRET" => Some("admin-integration-secret".to_string()),
        "UPLOAD_DIR" => Some(upload_dir.clone()),
        _ => None,
    })
    .unwrap();

    let state = AppState::in_memory(&config);

    TestApp {
        router: router(state.clone(), &config),
        state,
        uploads,
    }
}

pub fn user_request(first_name: &str, last_name: &str, email: &str) -> UserRequest {
    UserRequest {
        first_name: first_name.to_string(),
        last_name: last_name.to_string(),
        email: email.to_string(),
        phone: "08123456789".to_string(),
        dob: "1985-06-15".to_string(),
        gender: Gender::Male,
        password: PASSWORD.to_string(),
    }
}

pub fn register_body(email: &str) -> Value {
    serde_json::json!({
        "firstName": "Alice",
        "lastName": "Liddell",
        "email": email,
        "phone": "08123456789",
        "dob": "1990-04-01",
        "gender": "Female",
        "password": PASSWORD,
    })
}

impl TestApp {
    pub async fn seed_admin(&self) -> UserModel {
        create_user(
            &self.state.users,
            &self.state.argon,
            NewUser::new(user_request("Root", "Admin", "root@example.com"), Role::Admin),
        )
        .await
        .unwrap()
    }

    pub async fn seed_doctor(&self) -> UserModel {
        let mut doctor = NewUser::new(
            user_request("Gregory", "House", "house@example.com"),
            Role::Doctor,
        );
        doctor.doctor_department = Some("Cardiology".to_string());

        create_user(&self.state.users, &self.state.argon, doctor)
            .await
            .unwrap()
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(request).await.unwrap();

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };

        TestResponse {
            status,
            headers,
            body,
        }
    }

    pub async fn json(
        &self,
        method: Method,
        uri: &str,
        cookie: Option<&str>,
        body: Value,
    ) -> TestResponse {
        let mut request = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(cookie) = cookie {
            request = request.header(header::COOKIE, cookie);
        }

        self.send(request.body(Body::from(body.to_string())).unwrap())
            .await
    }

    pub async fn get(&self, uri: &str, cookie: Option<&str>) -> TestResponse {
        let mut request = Request::get(uri);
        if let Some(cookie) = cookie {
            request = request.header(header::COOKIE, cookie);
        }

        self.send(request.body(Body::empty()).unwrap()).await
    }

    /// Logs in and returns the session cookie.
    pub async fn login(&self, email: &str, role: &str) -> String {
        let response = self
            .json(
                Method::POST,
                "/api/login",
                None,
                serde_json::json!({
                    "email": email,
                    "password": PASSWORD,
                    "confirmPassword": PASSWORD,
                    "role": role,
                }),
            )
            .await;
        assert_eq!(response.status, StatusCode::OK, "{}", response.body);

        response.cookie()
    }
}

pub fn multipart_body(fields: &[(&str, &str)], file: Option<(&str, &[u8])>) -> Vec<u8> {
    let mut body = Vec::new();

    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }

    if let Some((content_type, bytes)) = file {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"docAvatar\"; filename=\"avatar\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }

    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}
