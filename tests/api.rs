use actix_web::{
    dev::{Service, ServiceResponse},
    http::StatusCode,
    test, web, App,
};
use chrono::Utc;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

use splitflow::api::{configure, AppState};
use splitflow::auth::HmacVerifier;
use splitflow::store::MemoryStore;
use splitflow::Ledger;

const SECRET: &str = "integration-secret";

fn token(member: &str) -> String {
    let verifier = HmacVerifier::new(SECRET);
    format!("Bearer {}", verifier.issue(member, Utc::now().timestamp() + 600))
}

fn state() -> web::Data<AppState> {
    web::Data::new(AppState {
        ledger: Ledger::new(Arc::new(MemoryStore::new())),
        verifier: Arc::new(HmacVerifier::new(SECRET)),
    })
}

async fn call<S>(app: &S, method: &str, uri: &str, member: &str, body: Option<Value>) -> ServiceResponse
where
    S: Service<actix_http::Request, Response = ServiceResponse, Error = actix_web::Error>,
{
    let request = match method {
        "POST" => test::TestRequest::post(),
        "DELETE" => test::TestRequest::delete(),
        _ => test::TestRequest::get(),
    }
    .uri(uri)
    .insert_header(("Authorization", token(member)));
    let request = match body {
        Some(body) => request.set_json(body),
        None => request,
    };
    test::call_service(app, request.to_request()).await
}

async fn create_group<S>(app: &S, owner: &str, members: &[&str]) -> String
where
    S: Service<actix_http::Request, Response = ServiceResponse, Error = actix_web::Error>,
{
    let res = call(
        app,
        "POST",
        "/api/groups",
        owner,
        Some(json!({ "name": "Trip to NYC", "member_name": owner.to_uppercase() })),
    )
    .await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let group: Value = test::read_body_json(res).await;
    let id = group["id"].as_str().unwrap().to_string();

    for member in members {
        let res = call(
            app,
            "POST",
            &format!("/api/groups/{id}/members"),
            owner,
            Some(json!({ "id": member, "name": member.to_uppercase() })),
        )
        .await;
        assert_eq!(res.status(), StatusCode::CREATED);
    }
    id
}

#[actix_web::test]
async fn dinner_for_three_end_to_end() {
    let app = test::init_service(App::new().app_data(state()).configure(configure)).await;
    let group = create_group(&app, "a", &["b", "c"]).await;

    let res = call(
        &app,
        "POST",
        &format!("/api/groups/{group}/expenses"),
        "b",
        Some(json!({
            "payer": "a",
            "amount": 90,
            "date": "2024-05-01",
            "description": "Dinner",
            "category": "Dining",
            "split": { "kind": "equal", "participants": ["a", "b", "c"] }
        })),
    )
    .await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let expense: Value = test::read_body_json(res).await;
    assert_eq!(expense["shares"], json!({ "a": 30, "b": 30, "c": 30 }));

    let res = call(&app, "GET", &format!("/api/groups/{group}/balances"), "c", None).await;
    assert_eq!(res.status(), StatusCode::OK);
    let balances: BTreeMap<String, i64> = test::read_body_json(res).await;
    assert_eq!(balances["a"], 60);
    assert_eq!(balances["b"], -30);
    assert_eq!(balances["c"], -30);

    let res = call(&app, "GET", &format!("/api/groups/{group}/settlement"), "a", None).await;
    let plan: Value = test::read_body_json(res).await;
    assert_eq!(
        plan,
        json!([
            { "from": "b", "to": "a", "amount": 30 },
            { "from": "c", "to": "a", "amount": 30 }
        ])
    );

    let res = call(
        &app,
        "POST",
        &format!("/api/groups/{group}/payments"),
        "b",
        Some(json!({ "payer": "b", "payee": "a", "amount": 30, "date": "2024-05-02", "method": "cash" })),
    )
    .await;
    assert_eq!(res.status(), StatusCode::CREATED);

    let res = call(&app, "GET", &format!("/api/groups/{group}/settlement"), "a", None).await;
    let plan: Value = test::read_body_json(res).await;
    assert_eq!(plan, json!([{ "from": "c", "to": "a", "amount": 30 }]));

    let res = call(&app, "GET", &format!("/api/groups/{group}/analytics"), "a", None).await;
    let analytics: Value = test::read_body_json(res).await;
    assert_eq!(analytics["total"], 90);
    assert_eq!(analytics["categories"][0]["category"], "Dining");

    let res = call(&app, "GET", &format!("/api/groups/{group}/report.csv"), "a", None).await;
    assert_eq!(res.status(), StatusCode::OK);
    let body = test::read_body(res).await;
    assert!(String::from_utf8_lossy(&body).contains("2024-05-01,Dinner,Trip to NYC,Dining,A,90,30"));
}

#[actix_web::test]
async fn invalid_split_is_unprocessable() {
    let app = test::init_service(App::new().app_data(state()).configure(configure)).await;
    let group = create_group(&app, "a", &["b"]).await;

    let res = call(
        &app,
        "POST",
        &format!("/api/groups/{group}/expenses"),
        "a",
        Some(json!({
            "payer": "a",
            "amount": 100,
            "date": "2024-05-01",
            "description": "Rent",
            "split": { "kind": "percentage", "percents": { "a": 50.0, "b": 40.0 } }
        })),
    )
    .await;
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = test::read_body_json(res).await;
    assert!(body["error"].as_str().unwrap().contains("100"));

    let res = call(&app, "GET", &format!("/api/groups/{group}/expenses"), "a", None).await;
    let expenses: Value = test::read_body_json(res).await;
    assert_eq!(expenses, json!([]));
}

#[actix_web::test]
async fn access_is_limited_to_members_and_owner() {
    let app = test::init_service(App::new().app_data(state()).configure(configure)).await;
    let group = create_group(&app, "a", &["b"]).await;

    let res = test::call_service(
        &app,
        test::TestRequest::get().uri("/api/groups").to_request(),
    )
    .await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = call(&app, "GET", &format!("/api/groups/{group}"), "stranger", None).await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = call(&app, "DELETE", &format!("/api/groups/{group}"), "b", None).await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = call(&app, "GET", "/api/groups", "b", None).await;
    let groups: Value = test::read_body_json(res).await;
    assert_eq!(groups.as_array().unwrap().len(), 1);

    let res = call(&app, "DELETE", &format!("/api/groups/{group}"), "a", None).await;
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    let res = call(&app, "GET", &format!("/api/groups/{group}/balances"), "a", None).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn expenses_and_report_can_be_narrowed() {
    let app = test::init_service(App::new().app_data(state()).configure(configure)).await;
    let group = create_group(&app, "a", &["b", "c"]).await;

    for (payer, date, description, participants) in [
        ("a", "2024-04-10", "Groceries", vec!["a", "b"]),
        ("b", "2024-05-03", "Museum tickets", vec!["b", "c"]),
        ("c", "2024-05-20", "Pizza night", vec!["a", "b", "c"]),
    ] {
        let res = call(
            &app,
            "POST",
            &format!("/api/groups/{group}/expenses"),
            payer,
            Some(json!({
                "payer": payer,
                "amount": 60,
                "date": date,
                "description": description,
                "split": { "kind": "equal", "participants": participants }
            })),
        )
        .await;
        assert_eq!(res.status(), StatusCode::CREATED);
    }

    let descriptions = |expenses: Value| -> Vec<String> {
        expenses
            .as_array()
            .unwrap()
            .iter()
            .map(|expense| expense["description"].as_str().unwrap().to_string())
            .collect()
    };

    let res = call(&app, "GET", &format!("/api/groups/{group}/expenses?q=PIZZA"), "a", None).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(descriptions(test::read_body_json(res).await), vec!["Pizza night"]);

    let res = call(&app, "GET", &format!("/api/groups/{group}/expenses?q=b"), "a", None).await;
    assert_eq!(descriptions(test::read_body_json(res).await), vec!["Museum tickets"]);

    let res = call(&app, "GET", &format!("/api/groups/{group}/expenses?since=2024-05-01"), "a", None).await;
    assert_eq!(
        descriptions(test::read_body_json(res).await),
        vec!["Museum tickets", "Pizza night"]
    );

    let res = call(&app, "GET", &format!("/api/groups/{group}/report.csv?since=2024-05-01"), "a", None).await;
    assert_eq!(res.status(), StatusCode::OK);
    let body = test::read_body(res).await;
    let report = String::from_utf8_lossy(&body);
    assert_eq!(
        report.lines().collect::<Vec<_>>(),
        vec![
            "date,description,group,category,paid_by,amount,your_share",
            "2024-05-03,Museum tickets,Trip to NYC,Uncategorized,B,60,0",
            "2024-05-20,Pizza night,Trip to NYC,Uncategorized,C,60,20",
        ]
    );

    let res = call(&app, "GET", &format!("/api/groups/{group}/report.csv?since=2030-01-01"), "a", None).await;
    let body = test::read_body(res).await;
    assert_eq!(
        String::from_utf8_lossy(&body).trim_end(),
        "date,description,group,category,paid_by,amount,your_share"
    );
}
