use cortex_provider::testing::ProviderTester;
use cortex_provider::{CortexProvider, ProviderError};
use httpmock::prelude::*;
use serde_json::json;

const CONFIG: &str = "route:\n  receiver: team\nreceivers:\n  - name: team\n";

const REMOTE: &str = r#"template_files:
  default.tmpl: '{{ define "title" }}alert{{ end }}'
alertmanager_config: |
  route:
    receiver: team
  receivers:
    - name: team
"#;

async fn configured(server: &MockServer) -> ProviderTester<CortexProvider> {
    let tester = ProviderTester::new(CortexProvider::with_env_lookup(|name| {
        (name == "CORTEX_TENANT_ID").then(|| "ops".to_string())
    }));
    tester
        .configure(json!({"address": server.base_url()}))
        .await
        .unwrap();
    tester
}

#[tokio::test]
async fn creates_and_reads_configuration() {
    let server = MockServer::start_async().await;
    let create = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/v1/alerts")
                .header("x-scope-orgid", "ops")
                .body_includes("alertmanager_config")
                .body_includes("default.tmpl");
            then.status(201);
        })
        .await;
    let get = server
        .mock_async(|when, then| {
            when.method(GET).path("/api/v1/alerts");
            then.status(200).body(REMOTE);
        })
        .await;

    let tester = configured(&server).await;
    let state = tester
        .lifecycle_create(
            "cortex_alertmanager",
            json!({
                "config_yaml": CONFIG,
                "templates": {"default.tmpl": "{{ define \"title\" }}alert{{ end }}"},
            }),
        )
        .await
        .unwrap();

    create.assert_async().await;
    get.assert_async().await;
    assert_eq!(state["id"], "default");
    assert_eq!(state["config_yaml"], CONFIG);
    assert_eq!(
        state["templates"]["default.tmpl"],
        "{{ define \"title\" }}alert{{ end }}"
    );
}

#[tokio::test]
async fn tenant_scoped_configuration() {
    let server = MockServer::start_async().await;
    let create = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/v1/alerts")
                .header("x-scope-orgid", "team-a");
            then.status(201);
        })
        .await;

    let tester = configured(&server).await;
    let state = tester
        .create(
            "cortex_alertmanager",
            json!({"config_yaml": CONFIG, "tenant_id": "team-a"}),
        )
        .await
        .unwrap();

    create.assert_async().await;
    assert_eq!(state["id"], "team-a");
    assert!(state["templates"].is_null());
}

#[tokio::test]
async fn read_of_missing_configuration_is_null() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/v1/alerts");
            then.status(404).body("alertmanager configuration not found");
        })
        .await;

    let tester = configured(&server).await;
    let state = tester
        .read(
            "cortex_alertmanager",
            json!({"config_yaml": CONFIG, "templates": null, "tenant_id": null, "id": "default"}),
        )
        .await
        .unwrap();
    assert!(state.is_null());
}

#[tokio::test]
async fn delete_tolerates_missing_configuration() {
    let server = MockServer::start_async().await;
    let delete = server
        .mock_async(|when, then| {
            when.method(DELETE).path("/api/v1/alerts");
            then.status(404);
        })
        .await;

    let tester = configured(&server).await;
    tester
        .lifecycle_delete(
            "cortex_alertmanager",
            json!({"config_yaml": CONFIG, "templates": null, "tenant_id": null, "id": "default"}),
        )
        .await
        .unwrap();
    delete.assert_async().await;
}

#[tokio::test]
async fn imports_default_tenant() {
    let server = MockServer::start_async().await;
    let get = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/api/v1/alerts")
                .header("x-scope-orgid", "ops");
            then.status(200).body(REMOTE);
        })
        .await;

    let tester = configured(&server).await;
    let imported = tester
        .import_resource("cortex_alertmanager", "default")
        .await
        .unwrap();

    get.assert_async().await;
    let state = &imported[0].state;
    assert_eq!(state["id"], "default");
    assert!(state["tenant_id"].is_null());
    assert!(state["config_yaml"].as_str().unwrap().contains("receiver: team"));
    assert!(state["templates"]["default.tmpl"].is_string());
}

#[tokio::test]
async fn import_of_missing_configuration_fails() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/api/v1/alerts")
                .header("x-scope-orgid", "team-a");
            then.status(404);
        })
        .await;

    let tester = configured(&server).await;
    let err = tester
        .import_resource("cortex_alertmanager", "team-a")
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::NotFound(_)));
}

#[tokio::test]
async fn unconfigured_provider_rejects_operations() {
    let tester = ProviderTester::new(CortexProvider::with_env_lookup(|_| None));
    let err = tester
        .create("cortex_alertmanager", json!({"config_yaml": CONFIG}))
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::Configuration(_)));
}
