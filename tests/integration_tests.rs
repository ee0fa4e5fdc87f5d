/// Integration tests for the Box asset source
///
/// Every test runs against a local mock of the Box API
use async_trait::async_trait;
use box_asset_source::{
    ApiEndpoints, AuthUrlBuilder, BoxAssetSource, BoxError, BoxSourceOptions, Cache, DiskCache,
    FileIndex, ImportLedger, MemoryCache, NoImportLedger, SourceServices,
};
use bytes::Bytes;
use futures_util::TryStreamExt;
use mockito::{Matcher, Mock, Server, ServerGuard};
use std::collections::HashMap;
use std::sync::Arc;
use tempfile::TempDir;
use tokio_test::assert_ok;

struct HostUrls;

impl AuthUrlBuilder for HostUrls {
    fn request_token_url(&self, source_id: &str) -> String {
        format!("https://cms.example/box/{}/request-token", source_id)
    }

    fn callback_url(&self, source_id: &str) -> String {
        format!("https://cms.example/box/{}/receive-token", source_id)
    }
}

#[derive(Default)]
struct MemoryLedger {
    imported: HashMap<(String, String), String>,
}

#[async_trait]
impl ImportLedger for MemoryLedger {
    async fn local_asset_identifier(
        &self,
        source_id: &str,
        remote_asset_id: &str,
    ) -> Option<String> {
        self.imported
            .get(&(source_id.to_string(), remote_asset_id.to_string()))
            .cloned()
    }
}

fn dev_options() -> BoxSourceOptions {
    BoxSourceOptions::from_json(
        r#"{"label": "Box Assets", "folder": "1", "useDevToken": true, "devToken": "dev"}"#,
    )
    .unwrap()
}

fn oauth_options(server: &ServerGuard) -> BoxSourceOptions {
    BoxSourceOptions {
        label: "Box Assets".to_string(),
        folder: "1".to_string(),
        client_id: "client".to_string(),
        client_secret: "secret".to_string(),
        authentication_url: format!("{}/oauth2/token", server.url()),
        use_dev_token: false,
        dev_token: None,
    }
}

fn services_with(value_cache: Arc<dyn Cache>, ledger: Arc<dyn ImportLedger>) -> SourceServices {
    SourceServices {
        token_cache: Arc::new(MemoryCache::new()),
        value_cache,
        auth_urls: Arc::new(HostUrls),
        import_ledger: ledger,
    }
}

fn services() -> SourceServices {
    services_with(Arc::new(MemoryCache::new()), Arc::new(NoImportLedger))
}

fn source_with(
    server: &ServerGuard,
    options: BoxSourceOptions,
    services: SourceServices,
) -> BoxAssetSource {
    let endpoints = ApiEndpoints {
        api_base_url: server.url(),
        authorize_url: "https://account.box.com/api/oauth2/authorize".to_string(),
    };
    BoxAssetSource::create_with_endpoints("box-assets", options, services, endpoints).unwrap()
}

fn file_json(id: &str, name: &str) -> String {
    format!(
        r#"{{"type": "file", "id": "{}", "name": "{}", "size": 1024,
             "modified_at": "2019-05-02T08:30:00+00:00"}}"#,
        id, name
    )
}

fn folder_json(id: &str) -> String {
    format!(r#"{{"type": "folder", "id": "{}", "name": "Folder {}"}}"#, id, id)
}

fn listing(entries: &[String]) -> String {
    format!(
        r#"{{"total_count": {}, "entries": [{}]}}"#,
        entries.len(),
        entries.join(",")
    )
}

/// Folder 1 holds a.jpg and folder 2; folder 2 holds b.png
async fn mock_tree(server: &mut ServerGuard, hits: usize) -> (Mock, Mock) {
    let root = server
        .mock("GET", "/folders/1/items")
        .match_query(Matcher::Any)
        .match_header("authorization", "Bearer dev")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(listing(&[file_json("11", "a.jpg"), folder_json("2")]))
        .expect(hits)
        .create_async()
        .await;
    let sub = server
        .mock("GET", "/folders/2/items")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(listing(&[file_json("22", "b.png")]))
        .expect(hits)
        .create_async()
        .await;
    (root, sub)
}

#[tokio::test]
async fn test_find_all_serves_flattened_index() {
    let mut server = Server::new_async().await;
    // One count query and one page per folder, built exactly once
    let (root, sub) = mock_tree(&mut server, 2).await;

    let source = source_with(&server, dev_options(), services());
    let repository = source.asset_proxy_repository();

    let result = repository.find_all();
    let proxies = assert_ok!(result.to_vec().await);
    let names: Vec<_> = proxies.iter().map(|p| p.filename()).collect();
    assert_eq!(names, vec!["a.jpg", "b.png"]);
    assert_eq!(assert_ok!(result.count().await), 2);

    // Unfiltered count equals the index length and reuses the cached index
    assert_eq!(assert_ok!(repository.query().count().await), 2);

    root.assert_async().await;
    sub.assert_async().await;
}

#[tokio::test]
async fn test_query_pagination_edges() {
    let mut server = Server::new_async().await;
    let _tree = mock_tree(&mut server, 2).await;

    let source = source_with(&server, dev_options(), services());
    let repository = source.asset_proxy_repository();

    let mut query = repository.query();
    assert_eq!(query.limit(), 20);
    assert_eq!(query.offset(), 0);

    query.set_limit(1);
    query.set_offset(1);
    let page = assert_ok!(query.array_result().await);
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].identifier(), "22");

    query.set_offset(5);
    assert!(assert_ok!(query.array_result().await).is_empty());

    query.set_offset(0);
    query.set_limit(0);
    assert!(assert_ok!(query.array_result().await).is_empty());
}

#[tokio::test]
async fn test_search_bypasses_index() {
    let mut server = Server::new_async().await;
    let (root, _sub) = mock_tree(&mut server, 0).await;
    let search_page = server
        .mock("GET", "/search")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("query".into(), "logo".into()),
            Matcher::UrlEncoded("type".into(), "file".into()),
            Matcher::UrlEncoded("limit".into(), "20".into()),
            Matcher::UrlEncoded("offset".into(), "0".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"total_count": 57, "entries": [{"type": "file", "id": "9", "name": "logo.svg"}]}"#)
        .expect(1)
        .create_async()
        .await;
    let search_count = server
        .mock("GET", "/search")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("query".into(), "logo".into()),
            Matcher::UrlEncoded("limit".into(), "1".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"total_count": 57, "entries": []}"#)
        .expect(1)
        .create_async()
        .await;

    let source = source_with(&server, dev_options(), services());
    let repository = source.asset_proxy_repository();

    // Not fetched yet, so count asks Box for the total
    let result = repository.find_by_search_term("logo");
    assert_eq!(assert_ok!(result.count().await), 57);

    let first = assert_ok!(result.first().await).unwrap();
    assert_eq!(first.filename(), "logo.svg");
    // Materialized: the page size from now on
    assert_eq!(assert_ok!(result.count().await), 1);
    assert_eq!(result.query().search_term(), Some("logo"));

    search_page.assert_async().await;
    search_count.assert_async().await;
    root.assert_async().await;
}

#[tokio::test]
async fn test_get_asset_proxy_caches_file_info() {
    let mut server = Server::new_async().await;
    let info = server
        .mock("GET", "/files/9")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(file_json("9", "Team Photo.JPG"))
        .expect(1)
        .create_async()
        .await;

    let source = source_with(&server, dev_options(), services());
    let repository = source.asset_proxy_repository();

    let proxy = assert_ok!(repository.get_asset_proxy("9").await);
    let again = assert_ok!(repository.get_asset_proxy("9").await);
    assert_eq!(proxy.entry(), again.entry());

    assert_eq!(proxy.identifier(), "9");
    assert_eq!(proxy.label(), "Team Photo.JPG");
    assert_eq!(proxy.file_extension(), "JPG");
    assert_eq!(proxy.media_type(), "image/jpeg");
    assert_eq!(proxy.file_size(), 1024);
    assert_eq!(
        proxy.last_modified().unwrap().to_rfc3339(),
        "2019-05-02T08:30:00+00:00"
    );
    assert_eq!(proxy.width_in_pixels(), None);
    assert_eq!(proxy.height_in_pixels(), None);
    assert_eq!(proxy.asset_source_identifier(), "box-assets");

    info.assert_async().await;
}

#[tokio::test]
async fn test_thumbnail_and_preview_data_uris() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", "/files/9")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(file_json("9", "logo.png"))
        .create_async()
        .await;
    let thumbnail = server
        .mock("GET", "/files/9/thumbnail.png")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body("thumb")
        .expect(1)
        .create_async()
        .await;
    let content = server
        .mock("GET", "/files/9/content")
        .with_status(200)
        .with_body("full")
        .expect(1)
        .create_async()
        .await;

    let source = source_with(&server, dev_options(), services());
    let proxy = assert_ok!(source.asset_proxy_repository().get_asset_proxy("9").await);

    // base64("thumb") and base64("full")
    let expected_thumb = Some("data:image/png;base64,dGh1bWI=".to_string());
    assert_eq!(assert_ok!(proxy.thumbnail_uri().await), expected_thumb);
    assert_eq!(assert_ok!(proxy.thumbnail_uri().await), expected_thumb);

    let expected_preview = Some("data:image/png;base64,ZnVsbA==".to_string());
    assert_eq!(assert_ok!(proxy.preview_uri().await), expected_preview);
    assert_eq!(assert_ok!(proxy.preview_uri().await), expected_preview);

    thumbnail.assert_async().await;
    content.assert_async().await;
}

#[tokio::test]
async fn test_no_previews_for_other_file_types() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", "/files/5")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(file_json("5", "report.pdf"))
        .create_async()
        .await;
    let thumbnail = server
        .mock("GET", "/files/5/thumbnail.pdf")
        .match_query(Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let source = source_with(&server, dev_options(), services());
    let proxy = assert_ok!(source.asset_proxy_repository().get_asset_proxy("5").await);

    assert_eq!(proxy.media_type(), "application/pdf");
    assert_eq!(assert_ok!(proxy.thumbnail_uri().await), None);
    assert_eq!(assert_ok!(proxy.preview_uri().await), None);
    thumbnail.assert_async().await;
}

#[tokio::test]
async fn test_import_stream_and_ledger() {
    let mut server = Server::new_async().await;
    let _tree = mock_tree(&mut server, 2).await;
    let _mock = server
        .mock("GET", "/files/11/content")
        .with_status(200)
        .with_body("jpeg-bytes")
        .create_async()
        .await;

    let mut ledger = MemoryLedger::default();
    ledger.imported.insert(
        ("box-assets".to_string(), "11".to_string()),
        "local-asset-uuid".to_string(),
    );
    let services = services_with(Arc::new(MemoryCache::new()), Arc::new(ledger));
    let source = source_with(&server, dev_options(), services);

    let proxies = assert_ok!(source.asset_proxy_repository().find_all().to_vec().await);
    let imported = &proxies[0];
    let fresh = &proxies[1];

    assert!(imported.is_imported().await);
    assert_eq!(
        imported.local_asset_identifier().await.as_deref(),
        Some("local-asset-uuid")
    );
    assert!(!fresh.is_imported().await);
    assert_eq!(fresh.local_asset_identifier().await, None);

    let chunks: Vec<Bytes> = assert_ok!(
        assert_ok!(imported.import_stream().await)
            .try_collect()
            .await
    );
    assert_eq!(chunks.concat(), b"jpeg-bytes".to_vec());
}

#[tokio::test]
async fn test_count_all_reports_root_total() {
    let mut server = Server::new_async().await;
    let count = server
        .mock("GET", "/folders/1/items")
        .match_query(Matcher::UrlEncoded("limit".into(), "1".into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"total_count": 312, "entries": []}"#)
        .expect(1)
        .create_async()
        .await;

    let source = source_with(&server, dev_options(), services());
    assert_eq!(
        assert_ok!(source.asset_proxy_repository().count_all().await),
        312
    );
    count.assert_async().await;
}

#[tokio::test]
async fn test_missing_authorization_is_actionable() {
    let server = Server::new_async().await;
    let source = source_with(&server, oauth_options(&server), services());
    assert!(!source.is_authorized().await);

    let err = source
        .asset_proxy_repository()
        .find_all()
        .to_vec()
        .await
        .unwrap_err();
    assert!(err.is_missing_authorization());
    assert!(err
        .to_string()
        .contains("https://cms.example/box/box-assets/request-token"));
}

#[tokio::test]
async fn test_authorization_flow_end_to_end() {
    let mut server = Server::new_async().await;
    let exchange = server
        .mock("POST", "/oauth2/token")
        .match_body(Matcher::UrlEncoded("code".into(), "granted-code".into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"access_token": "oauth-token", "expires_in": 3600}"#)
        .expect(1)
        .create_async()
        .await;
    let count = server
        .mock("GET", "/folders/1/items")
        .match_query(Matcher::Any)
        .match_header("authorization", "Bearer oauth-token")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"total_count": 4, "entries": []}"#)
        .expect(1)
        .create_async()
        .await;

    let source = source_with(&server, oauth_options(&server), services());
    let flow = source.authorization_flow();

    let redirect = assert_ok!(flow.request_token().await);
    let params: HashMap<String, String> = redirect.query_pairs().into_owned().collect();
    assert_eq!(params["client_id"], "client");
    assert_eq!(
        params["redirect_uri"],
        "https://cms.example/box/box-assets/receive-token"
    );

    assert_ok!(flow.receive_token("granted-code", &params["state"]).await);
    assert!(source.is_authorized().await);

    assert_eq!(
        assert_ok!(source.asset_proxy_repository().count_all().await),
        4
    );

    source.disconnect().await;
    assert!(!source.is_authorized().await);

    exchange.assert_async().await;
    count.assert_async().await;
}

#[tokio::test]
async fn test_disk_cached_index_survives_restart() {
    let temp_dir = TempDir::new().unwrap();
    let cache_path = temp_dir.path().to_path_buf();

    let mut server = Server::new_async().await;
    let (root, sub) = mock_tree(&mut server, 2).await;

    let cache = Arc::new(DiskCache::new(cache_path.clone()).await.unwrap());
    let source = source_with(
        &server,
        dev_options(),
        services_with(cache.clone(), Arc::new(NoImportLedger)),
    );
    assert_eq!(
        assert_ok!(source.asset_proxy_repository().query().count().await),
        2
    );
    assert!(cache.contains(&FileIndex::cache_key("1")).await);

    // A new process with the same cache directory does not hit Box again
    let cache2 = Arc::new(DiskCache::new(cache_path).await.unwrap());
    let restarted = source_with(
        &server,
        dev_options(),
        services_with(cache2, Arc::new(NoImportLedger)),
    );
    let proxies = assert_ok!(restarted.asset_proxy_repository().find_all().to_vec().await);
    assert_eq!(proxies.len(), 2);

    root.assert_async().await;
    sub.assert_async().await;
}

#[tokio::test]
async fn test_refresh_index_rebuilds() {
    let mut server = Server::new_async().await;
    let (root, sub) = mock_tree(&mut server, 4).await;

    let source = source_with(&server, dev_options(), services());
    let repository = source.asset_proxy_repository();

    assert_eq!(assert_ok!(repository.query().count().await), 2);
    assert_ok!(source.refresh_index().await);
    assert_eq!(assert_ok!(repository.query().count().await), 2);

    root.assert_async().await;
    sub.assert_async().await;
}

#[tokio::test]
async fn test_remote_errors_propagate() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", "/folders/1/items")
        .match_query(Matcher::Any)
        .with_status(503)
        .with_body("maintenance")
        .create_async()
        .await;

    let source = source_with(&server, dev_options(), services());
    match source.asset_proxy_repository().find_all().first().await {
        Err(BoxError::RemoteRequestFailed { status, message }) => {
            assert_eq!(status, Some(503));
            assert_eq!(message, "maintenance");
        }
        other => panic!("Expected RemoteRequestFailed, got {:?}", other),
    }
}

#[test]
fn test_source_metadata_and_validation() {
    let services = services();
    let source =
        BoxAssetSource::create_from_configuration("box-assets", dev_options(), services.clone())
            .unwrap();
    assert_eq!(source.identifier(), "box-assets");
    assert_eq!(source.label(), "Box Assets");
    assert!(source.is_read_only());
    assert_eq!(source.client().base_folder_id(), "1");

    assert!(matches!(
        BoxAssetSource::create_from_configuration("Box Assets", dev_options(), services.clone()),
        Err(BoxError::InvalidConfig { .. })
    ));

    let mut options = dev_options();
    options.dev_token = None;
    assert!(matches!(
        BoxAssetSource::create_from_configuration("box-assets", options, services),
        Err(BoxError::InvalidConfig { .. })
    ));
}
