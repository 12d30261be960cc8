use std::path::PathBuf;
use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::StatusCode;
use serde_json::json;

use payrun_api::app::{
    self, AppServices, Workers,
    services::{EmployeeService, PayrollService},
};
use payrun_auth::{JwtClaims, Role};
use payrun_core::UserId;
use payrun_infra::PayrunConfig;
use payrun_infra::employees::{EmployeeDirectory, InMemoryEmployeeDirectory};
use payrun_infra::jobs::{InMemoryJobStore, JobStore, RetryPolicy};
use payrun_infra::payslips::{FsPayslipGenerator, PayslipGenerator};
use payrun_infra::summaries::{FsSummaryStore, SummaryStore};

const SECRET: &str = "black-box-secret";

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
    workers: Option<Workers>,
    dir: PathBuf,
}

impl TestServer {
    /// Full application (same wiring as prod) seeded with `employees`.
    async fn spawn(label: &str, employees: serde_json::Value) -> Self {
        let dir = temp_dir(label);
        let seed = dir.join("employees.json");
        std::fs::write(&seed, serde_json::to_vec(&employees).unwrap()).unwrap();

        let config = PayrunConfig {
            jwt_secret: Some(SECRET.to_string()),
            payslips_dir: dir.join("payslips"),
            payrolls_dir: dir.join("payrolls"),
            employees_file: Some(seed),
            payroll_backoff: std::time::Duration::from_millis(20),
            ..PayrunConfig::default()
        };

        let app = app::build_app(&config).await.expect("failed to build app");
        Self::serve(app.router, Some(app.workers), dir).await
    }

    /// Router over an in-memory queue with no lanes draining it, so queued
    /// jobs stay pending for as long as the test needs.
    async fn spawn_without_workers(label: &str) -> Self {
        let dir = temp_dir(label);
        let jobs: Arc<dyn JobStore> = InMemoryJobStore::arc();
        let summaries: Arc<dyn SummaryStore> =
            Arc::new(FsSummaryStore::new(dir.join("payrolls")).unwrap());
        let payslips: Arc<dyn PayslipGenerator> =
            Arc::new(FsPayslipGenerator::new(dir.join("payslips")).unwrap());

        let directory: Arc<dyn EmployeeDirectory> = Arc::new(InMemoryEmployeeDirectory::default());

        let services = Arc::new(AppServices {
            payrolls: PayrollService::new(jobs, RetryPolicy::payroll_run()),
            employees: EmployeeService::new(directory),
            summaries,
            payslips,
        });

        Self::serve(app::router(services, SECRET.to_string()), None, dir).await
    }

    async fn serve(router: axum::Router, workers: Option<Workers>, dir: PathBuf) -> Self {
        // Bind to an ephemeral port.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        Self {
            base_url,
            handle,
            workers,
            dir,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
        if let Some(workers) = self.workers.take() {
            workers.shutdown();
        }
        let _ = std::fs::remove_dir_all(&self.dir);
    }
}

fn temp_dir(label: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "payrun-api-{label}-{}",
        uuid::Uuid::now_v7().simple()
    ));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn mint_jwt(jwt_secret: &str, role: Role) -> String {
    let now = Utc::now();
    let claims = JwtClaims {
        sub: UserId::new(),
        email: format!("{}@example.com", role.as_str()),
        role,
        issued_at: now,
        expires_at: now + ChronoDuration::minutes(10),
    };

    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(jwt_secret.as_bytes()),
    )
    .expect("failed to encode jwt")
}

fn employee(first_name: &str, department: &str, base_salary: i64) -> serde_json::Value {
    json!({
        "id": uuid::Uuid::now_v7(),
        "first_name": first_name,
        "last_name": "Tester",
        "email": format!("{}@example.com", first_name.to_lowercase()),
        "department": department,
        "job_title": "Engineer",
        "base_salary": base_salary,
        "status": "active",
    })
}

fn run_body(start: &str, end: &str) -> serde_json::Value {
    json!({ "payPeriod": { "start_date": start, "end_date": end } })
}

async fn wait_for_terminal(
    client: &reqwest::Client,
    server: &TestServer,
    token: &str,
    job_id: &str,
) -> serde_json::Value {
    // Jobs run on a background lane; poll until they settle.
    for _ in 0..200 {
        let res = client
            .get(server.url(&format!("/payrolls/jobs/{job_id}/status")))
            .bearer_auth(token)
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);

        let body: serde_json::Value = res.json().await.unwrap();
        let status = body["job"]["status"].as_str().unwrap().to_string();
        if status == "completed" || status == "failed" {
            return body["job"].clone();
        }

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }

    panic!("job {job_id} did not finish within timeout");
}

#[tokio::test]
async fn health_is_public_and_reports_queue_counts() {
    let server = TestServer::spawn_without_workers("health").await;
    let client = reqwest::Client::new();

    let res = client.get(server.url("/health")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["queue"]["waiting"], 0);
    assert_eq!(body["queue"]["failed"], 0);
}

#[tokio::test]
async fn protected_routes_require_a_valid_token() {
    let server = TestServer::spawn_without_workers("auth").await;
    let client = reqwest::Client::new();

    let res = client
        .post(server.url("/payrolls/run"))
        .json(&run_body("2024-01-01", "2024-01-31"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "unauthorized");

    let forged = mint_jwt("some-other-secret", Role::admin());
    let res = client
        .get(server.url("/payrolls"))
        .bearer_auth(&forged)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let now = Utc::now();
    let expired = jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &JwtClaims {
            sub: UserId::new(),
            email: "late@example.com".to_string(),
            role: Role::admin(),
            issued_at: now - ChronoDuration::hours(2),
            expires_at: now - ChronoDuration::hours(1),
        },
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap();
    let res = client
        .get(server.url("/payrolls"))
        .bearer_auth(&expired)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn user_context_is_derived_from_token() {
    let server = TestServer::spawn_without_workers("whoami").await;
    let client = reqwest::Client::new();
    let token = mint_jwt(SECRET, Role::manager());

    let res = client
        .get(server.url("/whoami"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["role"], "manager");
    assert_eq!(body["email"], "manager@example.com");
}

#[tokio::test]
async fn payroll_routes_are_limited_to_admin_and_hr() {
    let server = TestServer::spawn_without_workers("roles").await;
    let client = reqwest::Client::new();

    for role in [Role::employee(), Role::manager()] {
        let token = mint_jwt(SECRET, role);
        let res = client
            .post(server.url("/payrolls/run"))
            .bearer_auth(&token)
            .json(&run_body("2024-01-01", "2024-01-31"))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
        let body: serde_json::Value = res.json().await.unwrap();
        assert_eq!(body["error"], "forbidden");

        let res = client
            .get(server.url("/payrolls"))
            .bearer_auth(&token)
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
    }

    let hr = mint_jwt(SECRET, Role::hr());
    let res = client
        .get(server.url("/payrolls"))
        .bearer_auth(&hr)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn invalid_submissions_are_rejected() {
    let server = TestServer::spawn_without_workers("validation").await;
    let client = reqwest::Client::new();
    let token = mint_jwt(SECRET, Role::admin());

    let cases = [
        json!({}),
        run_body("2024-01-31", "2024-01-01"),
        run_body("2024-01-01", "2024-01-01"),
        run_body("not-a-date", "2024-01-31"),
        json!({ "payPeriod": { "start_date": "2024-01-01" } }),
        json!({
            "payPeriod": { "start_date": "2024-01-01", "end_date": "2024-01-31" },
            "filters": { "employee_ids": ["not-a-uuid"] }
        }),
    ];

    for body in cases {
        let res = client
            .post(server.url("/payrolls/run"))
            .bearer_auth(&token)
            .json(&body)
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST, "body: {body}");
        let err: serde_json::Value = res.json().await.unwrap();
        assert_eq!(err["error"], "validation_error");
    }

    let res = client
        .post(server.url("/payrolls/run"))
        .bearer_auth(&token)
        .json(&run_body("2024-01-31", "2024-01-01"))
        .send()
        .await
        .unwrap();
    let err: serde_json::Value = res.json().await.unwrap();
    assert_eq!(err["message"], "Start date must be before end date");
}

#[tokio::test]
async fn duplicate_submissions_need_force() {
    let server = TestServer::spawn_without_workers("duplicates").await;
    let client = reqwest::Client::new();
    let token = mint_jwt(SECRET, Role::hr());

    let res = client
        .post(server.url("/payrolls/run"))
        .bearer_auth(&token)
        .json(&run_body("2024-03-01", "2024-03-31"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::ACCEPTED);
    let first: serde_json::Value = res.json().await.unwrap();
    assert_eq!(first["message"], "Payroll job queued successfully");
    assert_eq!(first["job"]["status"], "queued");
    assert_eq!(first["job"]["queuePosition"], 1);
    assert_eq!(first["job"]["payPeriod"]["start_date"], "2024-03-01");
    let first_id = first["job"]["id"].as_str().unwrap().to_string();

    let res = client
        .post(server.url("/payrolls/run"))
        .bearer_auth(&token)
        .json(&run_body("2024-03-01", "2024-03-31"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let dup: serde_json::Value = res.json().await.unwrap();
    assert_eq!(dup["error"], "duplicate_job");
    assert_eq!(dup["existingJobId"], first_id.as_str());

    let mut forced = run_body("2024-03-01", "2024-03-31");
    forced["force"] = json!(true);
    let res = client
        .post(server.url("/payrolls/run"))
        .bearer_auth(&token)
        .json(&forced)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::ACCEPTED);
    let second: serde_json::Value = res.json().await.unwrap();
    assert_ne!(second["job"]["id"], first["job"]["id"]);
    assert_eq!(second["job"]["queuePosition"], 2);

    // A different period is never a duplicate.
    let res = client
        .post(server.url("/payrolls/run"))
        .bearer_auth(&token)
        .json(&run_body("2024-04-01", "2024-04-30"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::ACCEPTED);

    let res = client
        .get(server.url("/payrolls/jobs"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let list: serde_json::Value = res.json().await.unwrap();
    assert_eq!(list["total"], 3);
    assert_eq!(list["jobs"][0]["data"]["pay_period"]["start_date"], "2024-04-01");
    assert_eq!(list["jobs"][2]["id"], first_id.as_str());
}

#[tokio::test]
async fn status_of_pending_job_and_unknown_ids() {
    let server = TestServer::spawn_without_workers("status").await;
    let client = reqwest::Client::new();
    let token = mint_jwt(SECRET, Role::admin());

    let res = client
        .post(server.url("/payrolls/run"))
        .bearer_auth(&token)
        .json(&json!({
            "payPeriod": { "start_date": "2024-05-01", "end_date": "2024-05-31" },
            "filters": { "department": "Engineering" },
            "options": { "skipPayslips": true }
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::ACCEPTED);
    let queued: serde_json::Value = res.json().await.unwrap();
    let id = queued["job"]["id"].as_str().unwrap().to_string();

    let res = client
        .get(server.url(&format!("/payrolls/jobs/{id}/status")))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    let job = &body["job"];
    assert_eq!(job["status"], "waiting");
    assert_eq!(job["progress"], 0);
    assert_eq!(job["attemptsMade"], 0);
    assert_eq!(job["queuePosition"], 1);
    assert!(job["result"].is_null());
    assert!(job["failureReason"].is_null());
    assert!(job["processedAt"].is_null());
    assert_eq!(job["data"]["filters"]["department"], "Engineering");
    assert_eq!(job["data"]["options"]["skip_payslips"], true);
    assert_eq!(job["data"]["requested_by"]["role"], "admin");

    let res = client
        .get(server.url(&format!("/payrolls/jobs/{}/status", uuid::Uuid::now_v7())))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = client
        .get(server.url("/payrolls/jobs/not-a-job/status"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let err: serde_json::Value = res.json().await.unwrap();
    assert_eq!(err["error"], "invalid_id");
}

#[tokio::test]
async fn payroll_runs_end_to_end() {
    let server = TestServer::spawn(
        "e2e",
        json!([
            employee("Ada", "Engineering", 7_500_000),
            employee("Grace", "Operations", 5_000_000),
        ]),
    )
    .await;
    let client = reqwest::Client::new();
    let token = mint_jwt(SECRET, Role::admin());

    let res = client
        .post(server.url("/payrolls/run"))
        .bearer_auth(&token)
        .json(&json!({
            "payPeriod": { "start_date": "2024-01-01", "end_date": "2024-01-31" },
            "filters": { "department": "Engineering" }
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::ACCEPTED);
    let queued: serde_json::Value = res.json().await.unwrap();
    let id = queued["job"]["id"].as_str().unwrap().to_string();

    let job = wait_for_terminal(&client, &server, &token, &id).await;
    assert_eq!(job["status"], "completed", "job: {job}");
    assert_eq!(job["progress"], 100);
    assert!(job["finishedAt"].is_string());

    let result = &job["result"];
    assert_eq!(result["employees_processed"], 1);
    assert_eq!(result["employees_skipped"], 0);
    assert_eq!(result["total_gross"], 7_500_000);
    assert_eq!(result["total_net"], 6_225_000);
    assert_eq!(result["payslips_generated"], 1);
    let payroll_id = result["payroll_id"].as_str().unwrap().to_string();

    // Summary listing and detail.
    let res = client
        .get(server.url("/payrolls"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let list: serde_json::Value = res.json().await.unwrap();
    assert_eq!(list["total"], 1);
    assert_eq!(list["payrolls"][0]["id"], payroll_id.as_str());
    assert!(list["payrolls"][0].get("payroll_items").is_none());

    let res = client
        .get(server.url(&format!("/payrolls/{payroll_id}")))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let detail: serde_json::Value = res.json().await.unwrap();
    let item = &detail["payroll"]["payroll_items"][0];
    assert_eq!(item["gross_salary"], 7_500_000);
    assert_eq!(item["deductions"]["tax"], 750_000);
    assert_eq!(item["deductions"]["health_insurance"], 150_000);
    assert_eq!(item["deductions"]["retirement_401k"], 375_000);
    assert_eq!(item["deductions"]["total"], 1_275_000);
    assert_eq!(item["net_salary"], 6_225_000);

    // Payslip download.
    let reference = detail["payroll"]["payslip_files"][0].as_str().unwrap();
    let file_name = reference.strip_prefix("payslips/").unwrap();
    let res = client
        .get(server.url(&format!("/payslips/{file_name}")))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert!(
        res.headers()[reqwest::header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("application/pdf")
    );
    let pdf = res.bytes().await.unwrap();
    assert!(pdf.starts_with(b"%PDF-"));

    let res = client
        .get(server.url(&format!("/payrolls/payroll_{}", uuid::Uuid::now_v7().simple())))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn run_with_no_eligible_employees_fails() {
    let server = TestServer::spawn("empty", json!([employee("Ada", "Engineering", 100_000)])).await;
    let client = reqwest::Client::new();
    let token = mint_jwt(SECRET, Role::hr());

    let res = client
        .post(server.url("/payrolls/run"))
        .bearer_auth(&token)
        .json(&json!({
            "payPeriod": { "start_date": "2024-02-01", "end_date": "2024-02-29" },
            "filters": { "department": "Nowhere" }
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::ACCEPTED);
    let queued: serde_json::Value = res.json().await.unwrap();
    let id = queued["job"]["id"].as_str().unwrap().to_string();

    // Each retry waits out the backoff; a failure lands after the last attempt.
    let job = wait_for_terminal(&client, &server, &token, &id).await;
    assert_eq!(job["status"], "failed");
    assert_eq!(job["attemptsMade"], 3);
    assert!(job["failureReason"].as_str().unwrap().contains("no eligible employees"));
    assert!(job["result"].is_null());
}

#[tokio::test]
async fn payslip_download_rejects_traversal_and_unknown_files() {
    let server = TestServer::spawn_without_workers("payslips").await;
    let client = reqwest::Client::new();
    let token = mint_jwt(SECRET, Role::admin());

    for name in ["..%2F..%2Fetc%2Fpasswd", ".hidden", "..%5Csecret.txt"] {
        let res = client
            .get(server.url(&format!("/payslips/{name}")))
            .bearer_auth(&token)
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST, "name: {name}");
    }

    let res = client
        .get(server.url("/payslips/payslip_missing_2024-01-01_2024-01-31.pdf"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let employee = mint_jwt(SECRET, Role::employee());
    let res = client
        .get(server.url("/payslips/anything.pdf"))
        .bearer_auth(&employee)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

fn new_employee_body(first_name: &str, email: &str, department: &str) -> serde_json::Value {
    json!({
        "first_name": first_name,
        "last_name": "Hire",
        "email": email,
        "department": department,
        "job_title": "Analyst",
        "base_salary": 5_000_000,
    })
}

#[tokio::test]
async fn employee_crud_follows_role_tiers() {
    let server = TestServer::spawn_without_workers("employees").await;
    let client = reqwest::Client::new();
    let admin = mint_jwt(SECRET, Role::admin());
    let hr = mint_jwt(SECRET, Role::hr());
    let manager = mint_jwt(SECRET, Role::manager());
    let staff = mint_jwt(SECRET, Role::employee());

    // Create: admin and hr only.
    let res = client
        .post(server.url("/employees"))
        .bearer_auth(&manager)
        .json(&new_employee_body("Mia", "mia@example.com", "Sales"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = client
        .post(server.url("/employees"))
        .bearer_auth(&hr)
        .json(&new_employee_body("Mia", " Mia@Example.com ", "Sales"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let created: serde_json::Value = res.json().await.unwrap();
    assert_eq!(created["message"], "Employee created successfully");
    assert_eq!(created["employee"]["email"], "mia@example.com");
    assert_eq!(created["employee"]["status"], "active");
    let id = created["employee"]["id"].as_str().unwrap().to_string();

    let res = client
        .post(server.url("/employees"))
        .bearer_auth(&admin)
        .json(&new_employee_body("Other", "mia@example.com", "Ops"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let err: serde_json::Value = res.json().await.unwrap();
    assert_eq!(err["error"], "duplicate_email");

    let res = client
        .post(server.url("/employees"))
        .bearer_auth(&admin)
        .json(&json!({ "first_name": "", "last_name": "X", "email": "x@example.com",
                       "department": "Ops", "job_title": "Y", "base_salary": 1 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let err: serde_json::Value = res.json().await.unwrap();
    assert_eq!(err["error"], "validation_error");

    // Read: any authenticated user.
    let res = client
        .get(server.url(&format!("/employees/{id}")))
        .bearer_auth(&staff)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["employee"]["first_name"], "Mia");

    // Update: managers may edit, employees may not.
    let res = client
        .put(server.url(&format!("/employees/{id}")))
        .bearer_auth(&staff)
        .json(&json!({ "job_title": "Lead" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = client
        .put(server.url(&format!("/employees/{id}")))
        .bearer_auth(&manager)
        .json(&json!({ "job_title": "Lead", "base_salary": 6_000_000 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["employee"]["job_title"], "Lead");
    assert_eq!(body["employee"]["base_salary"], 6_000_000);
    assert_eq!(body["employee"]["department"], "Sales");

    // Delete: admin only, and it is a soft delete.
    let res = client
        .delete(server.url(&format!("/employees/{id}")))
        .bearer_auth(&hr)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = client
        .delete(server.url(&format!("/employees/{id}")))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["employee"]["status"], "terminated");

    let res = client
        .get(server.url(&format!("/employees/{id}")))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["employee"]["status"], "terminated");

    // Unknown and malformed ids.
    let missing = uuid::Uuid::now_v7();
    let res = client
        .put(server.url(&format!("/employees/{missing}")))
        .bearer_auth(&admin)
        .json(&json!({ "job_title": "Ghost" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = client
        .get(server.url("/employees/not-a-uuid"))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn employee_listing_paginates_and_department_stats_count() {
    let server = TestServer::spawn_without_workers("employee-list").await;
    let client = reqwest::Client::new();
    let admin = mint_jwt(SECRET, Role::admin());

    for (name, department) in [("Ann", "Sales"), ("Ben", "Engineering"), ("Cal", "Engineering")] {
        let res = client
            .post(server.url("/employees"))
            .bearer_auth(&admin)
            .json(&new_employee_body(
                name,
                &format!("{}@example.com", name.to_lowercase()),
                department,
            ))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);
    }

    let res = client
        .get(server.url("/employees?limit=2&page=1"))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["employees"].as_array().unwrap().len(), 2);
    assert_eq!(body["pagination"]["totalCount"], 3);
    assert_eq!(body["pagination"]["totalPages"], 2);
    assert_eq!(body["pagination"]["hasNextPage"], true);
    assert_eq!(body["pagination"]["hasPrevPage"], false);

    let res = client
        .get(server.url("/employees?department=Engineering&search=CAL"))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["pagination"]["totalCount"], 1);
    assert_eq!(body["employees"][0]["first_name"], "Cal");
    assert_eq!(body["filters"]["department"], "Engineering");

    for bad in ["/employees?limit=0", "/employees?page=abc", "/employees?status=retired"] {
        let res = client.get(server.url(bad)).bearer_auth(&admin).send().await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST, "query: {bad}");
    }

    let res = client
        .get(server.url("/employees/stats/departments"))
        .bearer_auth(&mint_jwt(SECRET, Role::manager()))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = client
        .get(server.url("/employees/stats/departments"))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(
        body["departmentStats"],
        json!([
            { "department": "Engineering", "count": 2 },
            { "department": "Sales", "count": 1 },
        ])
    );
}

#[tokio::test]
async fn employees_created_over_http_are_paid() {
    let server = TestServer::spawn("hired", json!([])).await;
    let client = reqwest::Client::new();
    let token = mint_jwt(SECRET, Role::hr());

    let res = client
        .post(server.url("/employees"))
        .bearer_auth(&token)
        .json(&new_employee_body("Nia", "nia@example.com", "Finance"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);

    let res = client
        .post(server.url("/payrolls/run"))
        .bearer_auth(&token)
        .json(&json!({
            "payPeriod": { "start_date": "2024-05-01", "end_date": "2024-05-31" },
            "filters": { "employee_ids": [] },
            "options": { "skipPayslips": true }
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::ACCEPTED);
    let queued: serde_json::Value = res.json().await.unwrap();
    let id = queued["job"]["id"].as_str().unwrap().to_string();

    let job = wait_for_terminal(&client, &server, &token, &id).await;
    assert_eq!(job["status"], "completed", "job: {job}");
    assert_eq!(job["result"]["employees_processed"], 1);
    assert_eq!(job["result"]["total_gross"], 5_000_000);
}
