use axum::body::{to_bytes, Body};
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use termdb_rust::config::AppConfig;
use termdb_rust::create_app;

// Test client wrapper driving the router in-process
struct TestClient {
    app: Router,
    headers: Vec<(&'static str, String)>,
}

impl TestClient {
    fn new() -> Self {
        Self {
            app: create_app(&AppConfig::default()),
            headers: Vec::new(),
        }
    }

    fn as_user(&self, user_id: &str, permissions: Option<&str>) -> Self {
        let mut headers = vec![("x-user-id", user_id.to_string())];
        if let Some(permissions) = permissions {
            headers.push(("x-user-permissions", permissions.to_string()));
        }
        Self {
            app: self.app.clone(),
            headers,
        }
    }

    async fn send(&self, method: Method, path: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(path);
        for (name, value) in &self.headers {
            request = request.header(*name, value);
        }
        let request = match body {
            Some(json) => request
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };

        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn post(&self, path: &str, json: Value) -> (StatusCode, Value) {
        self.send(Method::POST, path, Some(json)).await
    }

    async fn put(&self, path: &str, json: Value) -> (StatusCode, Value) {
        self.send(Method::PUT, path, Some(json)).await
    }

    async fn get(&self, path: &str) -> (StatusCode, Value) {
        self.send(Method::GET, path, None).await
    }

    async fn delete(&self, path: &str) -> (StatusCode, Value) {
        self.send(Method::DELETE, path, None).await
    }
}

fn bundle(id: &str, parent: &str) -> Value {
    json!({
        "resourceType": "bundles",
        "id": id,
        "url": format!("http://example.org/bundles/{}", id),
        "title": format!("Bundle {}", id),
        "bundleId": parent,
    })
}

#[tokio::test]
async fn test_health() {
    let client = TestClient::new();
    let (status, body) = client.get("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_resource_lifecycle() {
    let client = TestClient::new();

    let (status, body) = client.post("/resources", bundle("A", "-1")).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["result"], "A");
    assert!(body["commitTimestamp"].as_i64().unwrap() > 0);

    let (status, body) = client.post("/resources", bundle("B", "A")).await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);

    let (status, body) = client
        .post(
            "/resources",
            json!({
                "resourceType": "codesystems",
                "id": "SNOMEDCT",
                "url": "http://snomed.info/sct",
                "title": "SNOMED CT",
                "bundleId": "B",
                "toolingId": "snomed",
                "settings": {"locale": "en"},
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);

    // duplicate url
    let (status, body) = client
        .post(
            "/resources",
            json!({
                "resourceType": "codesystems",
                "id": "SNOMEDCT-2",
                "url": "http://snomed.info/sct",
                "title": "Copy",
                "toolingId": "snomed",
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "AlreadyExists");

    let (status, body) = client.get("/resources/SNOMEDCT?expand=bundleAncestors()").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["branchPath"], "MAIN/SNOMEDCT");
    assert_eq!(body["bundleAncestorIds"], json!(["-1", "A", "B"]));
    assert_eq!(body["bundleAncestors"][1]["title"], "Bundle B");

    let (status, body) = client.get("/resources?resourceType=bundles&sort=id:desc").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 2);
    assert_eq!(body["items"][0]["id"], "B");

    let (status, body) = client.get("/resources/aggregate?field=resourceType").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["buckets"]["bundles"], 2);
    assert_eq!(body["buckets"]["codesystems"], 1);

    let (status, body) = client
        .put("/resources/SNOMEDCT", json!({"title": "SNOMED CT International", "settings": {"locale": null}}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"], true);

    let (_, body) = client.get("/resources/SNOMEDCT").await;
    assert_eq!(body["title"], "SNOMED CT International");
    assert_eq!(body["settings"], json!({}));

    let (status, body) = client.put("/resources/A", json!({"bundleId": "B"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "CycleDetected");

    let (status, _) = client.delete("/resources/B").await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = client.delete("/resources/SNOMEDCT").await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = client.get("/resources/SNOMEDCT").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["kind"], "NotFound");
}

#[tokio::test]
async fn test_validation_errors_list_violations() {
    let client = TestClient::new();

    let (status, body) = client
        .post("/resources", json!({"resourceType": "bundles", "url": "", "title": ""}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "Validation");
    assert_eq!(body["violations"].as_array().unwrap().len(), 2);

    let (status, body) = client.get("/resources?sort=title:sideways").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "IllegalQueryParameter");
}

#[tokio::test]
async fn test_versions_and_concepts() {
    let client = TestClient::new();

    let (status, _) = client
        .post(
            "/resources",
            json!({
                "resourceType": "codesystems",
                "id": "SNOMEDCT",
                "url": "http://snomed.info/sct",
                "title": "SNOMED CT",
                "toolingId": "snomed",
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = client
        .post(
            "/codesystems/SNOMEDCT/concepts",
            json!([
                {"id": "138875005", "active": true, "term": "SNOMED CT Concept"},
                {"id": "404684003", "active": true, "term": "Clinical finding", "parents": ["138875005"]},
                {"id": "64572001", "active": false, "term": "Disease", "parents": ["404684003"], "ancestors": ["138875005"]},
            ]),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    assert_eq!(body["result"], 3);

    let (status, body) = client
        .get("/concepts?codeSystem=codesystems/SNOMEDCT&ancestor=138875005&active=true")
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["total"], 1);
    assert_eq!(body["items"][0]["id"], "404684003");

    let (status, body) = client
        .post(
            "/versions",
            json!({
                "resource": "codesystems/SNOMEDCT",
                "version": "2024-01-31",
                "effectiveTime": "2024-01-31",
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    assert_eq!(body["result"], "codesystems/SNOMEDCT/2024-01-31");

    let (status, body) = client
        .post(
            "/versions",
            json!({
                "resource": "codesystems/SNOMEDCT",
                "version": "2023-07-31",
                "effectiveTime": "2023-07-31",
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "BadRequest");

    let (status, body) = client.get("/versions?resource=codesystems/SNOMEDCT").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);

    let (status, body) = client.get("/repositories/snomed/branches/MAIN/SNOMEDCT/2024-01-31").await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["path"], "MAIN/SNOMEDCT/2024-01-31");

    // the version branch sees the content imported before it was created
    let (status, body) = client.get("/concepts?codeSystem=codesystems/SNOMEDCT/LATEST").await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["total"], 3);
}

#[tokio::test]
async fn test_branches() {
    let client = TestClient::new();

    let (status, body) = client
        .post("/repositories/lcs/branches", json!({"parent": "MAIN", "name": "feature"}))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["path"], "MAIN/feature");

    let (status, _) = client
        .post("/repositories/lcs/branches", json!({"parent": "MAIN", "name": "feature"}))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = client
        .post("/repositories/lcs/branches", json!({"parent": "MAIN", "name": "not valid!"}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = client.get("/repositories/lcs/branches?parent=MAIN").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);

    let (status, body) = client.delete("/repositories/lcs/branches/MAIN/feature").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deleted"], true);

    let (status, _) = client.get("/repositories/unknown/branches").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_permission_header_restricts_visibility() {
    let client = TestClient::new();

    for (id, parent) in [("A", "-1"), ("B", "A"), ("E", "-1")] {
        let (status, _) = client.post("/resources", bundle(id, parent)).await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let reader = client.as_user("reader", Some("A"));
    let (status, body) = reader.get("/resources?sort=id").await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<_> = body["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|item| item["id"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(ids, vec!["A", "B"]);

    let (status, _) = reader.get("/resources/E").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
