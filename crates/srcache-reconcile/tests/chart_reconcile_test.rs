//! End-to-end HelmChart reconciliation: a repository index is stored first,
//! then charts listed in it are pulled, replaced, and garbage collected.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use srcache_core::{
    ChartSelector, ConditionType, ManagedResource, ObjectKey, ResourceKind, ResourceSpec,
};
use srcache_fetch::{Getters, InMemorySecrets, Secret};
use srcache_reconcile::{
    ChartSource, InMemoryResourceStore, NextRun, ReconcileError, Reconciler, ReconcilerConfig,
    RepositorySource,
};
use srcache_storage::{Storage, StorageConfig};
use wiremock::matchers::{basic_auth, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const INTERVAL: Duration = Duration::from_secs(300);
const RETRY: Duration = Duration::from_secs(5);

struct Harness {
    root: tempfile::TempDir,
    store: Arc<InMemoryResourceStore>,
    secrets: Arc<InMemorySecrets>,
    repositories: Reconciler<RepositorySource>,
    charts: Reconciler<ChartSource>,
    repo_key: ObjectKey,
    chart_key: ObjectKey,
}

impl Harness {
    fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        let storage =
            Storage::new(StorageConfig::new(root.path(), "http://cache.local").unwrap()).unwrap();
        let store = Arc::new(InMemoryResourceStore::new());
        let secrets = Arc::new(InMemorySecrets::new());
        let getters = Getters::http().unwrap();
        let config = ReconcilerConfig {
            retry_interval: RETRY,
            ..ReconcilerConfig::default()
        };

        let repositories = Reconciler::new(
            RepositorySource::new(getters.clone(), secrets.clone()),
            storage.clone(),
            store.clone(),
            config.clone(),
        );
        let charts = Reconciler::new(
            ChartSource::new(getters, secrets.clone(), storage.clone(), store.clone()),
            storage,
            store.clone(),
            config,
        );

        Self {
            root,
            store,
            secrets,
            repositories,
            charts,
            repo_key: ObjectKey::new("default", "podinfo").unwrap(),
            chart_key: ObjectKey::new("default", "podinfo-chart").unwrap(),
        }
    }

    fn apply_repository(&self, spec: ResourceSpec) {
        self.store.apply(ManagedResource::new(
            ResourceKind::HelmRepository,
            self.repo_key.clone(),
            spec,
        ));
    }

    fn apply_chart(&self, name: &str, version: Option<&str>) {
        let selector = ChartSelector {
            repository: self.repo_key.name().to_string(),
            name: name.to_string(),
            version: version.map(str::to_string),
        };
        self.store.apply(ManagedResource::new(
            ResourceKind::HelmChart,
            self.chart_key.clone(),
            ResourceSpec::chart(selector, INTERVAL),
        ));
    }

    fn chart(&self) -> ManagedResource {
        self.store
            .snapshot(ResourceKind::HelmChart, &self.chart_key)
            .unwrap()
    }

    fn chart_dir_entries(&self) -> Vec<String> {
        entries(&self.root.path().join("helmchart/default/podinfo-chart"))
    }
}

fn entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = match fs::read_dir(dir) {
        Ok(rd) => rd
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect(),
        Err(_) => Vec::new(),
    };
    names.sort();
    names
}

fn index_yaml(versions: &[&str]) -> String {
    let mut out = String::from("apiVersion: v1\nentries:\n  podinfo:\n");
    for (i, v) in versions.iter().enumerate() {
        out.push_str(&format!(
            "    - name: podinfo\n      version: {v}\n      urls: [podinfo-{v}.tgz]\n      created: 2024-01-0{}T00:00:00Z\n",
            i + 1
        ));
    }
    out
}

fn chart_body(version: &str) -> Vec<u8> {
    format!("packaged chart podinfo {version}").into_bytes()
}

fn stored_name(version: &str, body: &[u8]) -> String {
    format!("podinfo-{version}-{}.tgz", srcache_core::sha256_hex(body))
}

async fn publish(server: &MockServer, versions: &[&str]) {
    server.reset().await;
    Mock::given(method("GET"))
        .and(path("/index.yaml"))
        .respond_with(ResponseTemplate::new(200).set_body_string(index_yaml(versions)))
        .mount(server)
        .await;
    for v in versions {
        Mock::given(method("GET"))
            .and(path(format!("/podinfo-{v}.tgz")))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(chart_body(v)))
            .mount(server)
            .await;
    }
}

#[tokio::test]
async fn chart_revisions_replace_each_other_and_leave_one_file() {
    let server = MockServer::start().await;
    publish(&server, &["1.0.0", "1.1.0", "1.2.0"]).await;
    let h = Harness::new();
    h.apply_repository(ResourceSpec::repository(server.uri(), INTERVAL));
    assert_eq!(
        h.repositories.reconcile(&h.repo_key).await.unwrap(),
        NextRun::After(INTERVAL)
    );

    for version in ["1.0.0", "1.1.0"] {
        h.apply_chart("podinfo", Some(version));
        assert_eq!(
            h.charts.reconcile(&h.chart_key).await.unwrap(),
            NextRun::After(INTERVAL)
        );
        assert_eq!(h.chart().status.artifact.unwrap().revision, version);
    }

    h.apply_chart("podinfo", None);
    h.charts.reconcile(&h.chart_key).await.unwrap();
    let chart = h.chart();
    let artifact = chart.status.artifact.clone().unwrap();
    assert_eq!(artifact.revision, "1.2.0");
    assert_eq!(
        artifact.path,
        format!(
            "helmchart/default/podinfo-chart/{}",
            stored_name("1.2.0", &chart_body("1.2.0"))
        )
    );
    assert_eq!(
        chart.status.url.as_deref(),
        Some("http://cache.local/helmchart/default/podinfo-chart/helmchart-latest.tgz")
    );
    assert_eq!(
        chart.status.conditions.get(ConditionType::Ready).unwrap().message,
        "Stored artifact for revision '1.2.0'"
    );
    assert_eq!(
        h.chart_dir_entries(),
        vec!["helmchart-latest.tgz".to_string(), stored_name("1.2.0", &chart_body("1.2.0"))]
    );

    let file = h.root.path().join(&artifact.path);
    let modified = fs::metadata(&file).unwrap().modified().unwrap();
    h.charts.reconcile(&h.chart_key).await.unwrap();
    assert_eq!(h.chart().status.artifact, chart.status.artifact);
    assert_eq!(fs::metadata(&file).unwrap().modified().unwrap(), modified);

    publish(&server, &["1.0.0", "1.1.0", "1.2.0", "1.3.0"]).await;
    h.repositories.reconcile(&h.repo_key).await.unwrap();
    h.charts.reconcile(&h.chart_key).await.unwrap();

    let artifact = h.chart().status.artifact.unwrap();
    assert_eq!(artifact.revision, "1.3.0");
    assert_eq!(artifact.checksum, srcache_core::sha256_hex(&chart_body("1.3.0")));
    assert_eq!(
        h.chart_dir_entries(),
        vec!["helmchart-latest.tgz".to_string(), stored_name("1.3.0", &chart_body("1.3.0"))]
    );
    #[cfg(unix)]
    assert_eq!(
        fs::read(h.root.path().join("helmchart/default/podinfo-chart/helmchart-latest.tgz"))
            .unwrap(),
        chart_body("1.3.0")
    );
}

#[tokio::test]
async fn chart_waits_for_repository_artifact() {
    let server = MockServer::start().await;
    publish(&server, &["1.0.0"]).await;
    let h = Harness::new();
    h.apply_repository(ResourceSpec::repository(server.uri(), INTERVAL));
    h.apply_chart("podinfo", None);

    let err = h.charts.reconcile(&h.chart_key).await.unwrap_err();
    assert!(matches!(err, ReconcileError::DependencyNotReady(_)));
    assert_eq!(err.next_run(RETRY), NextRun::After(RETRY));
    let failed = h
        .chart()
        .status
        .conditions
        .get(ConditionType::FetchFailed)
        .cloned()
        .unwrap();
    assert_eq!(failed.reason, "DependencyNotReady");
    assert_eq!(
        failed.message,
        "no repository index artifact found in HelmRepository 'podinfo'"
    );

    h.repositories.reconcile(&h.repo_key).await.unwrap();
    assert_eq!(
        h.charts.reconcile(&h.chart_key).await.unwrap(),
        NextRun::After(INTERVAL)
    );
    let status = h.chart().status;
    assert!(status.conditions.get(ConditionType::FetchFailed).is_none());
    assert!(status.conditions.is_true(ConditionType::Ready));
}

#[tokio::test]
async fn chart_without_repository_resource_is_not_ready() {
    let h = Harness::new();
    h.apply_chart("podinfo", None);

    let err = h.charts.reconcile(&h.chart_key).await.unwrap_err();
    assert!(matches!(err, ReconcileError::DependencyNotReady(_)));
    assert!(h.chart_dir_entries().is_empty());
}

#[tokio::test]
async fn unknown_chart_name_is_reported() {
    let server = MockServer::start().await;
    publish(&server, &["1.0.0"]).await;
    let h = Harness::new();
    h.apply_repository(ResourceSpec::repository(server.uri(), INTERVAL));
    h.repositories.reconcile(&h.repo_key).await.unwrap();
    h.apply_chart("nginx", None);

    let err = h.charts.reconcile(&h.chart_key).await.unwrap_err();
    assert!(matches!(err, ReconcileError::Content { .. }));
    let failed = h
        .chart()
        .status
        .conditions
        .get(ConditionType::FetchFailed)
        .cloned()
        .unwrap();
    assert_eq!(failed.reason, "ChartPullFailed");
    assert_eq!(
        failed.message,
        "chart 'nginx' could not be found in Helm repository 'podinfo'"
    );
}

#[tokio::test]
async fn unknown_chart_version_keeps_previous_artifact() {
    let server = MockServer::start().await;
    publish(&server, &["1.0.0"]).await;
    let h = Harness::new();
    h.apply_repository(ResourceSpec::repository(server.uri(), INTERVAL));
    h.repositories.reconcile(&h.repo_key).await.unwrap();
    h.apply_chart("podinfo", Some("1.0.0"));
    h.charts.reconcile(&h.chart_key).await.unwrap();
    let before = h.chart().status.artifact.unwrap();

    h.apply_chart("podinfo", Some("9.9.9"));
    let err = h.charts.reconcile(&h.chart_key).await.unwrap_err();
    assert_eq!(err.next_run(RETRY), NextRun::OnChange);

    let status = h.chart().status;
    assert_eq!(status.artifact, Some(before));
    assert!(!status.conditions.is_true(ConditionType::Ready));
    assert_eq!(
        status.conditions.get(ConditionType::FetchFailed).unwrap().reason,
        "ChartPullFailed"
    );
    assert_eq!(
        h.chart_dir_entries(),
        vec!["helmchart-latest.tgz".to_string(), stored_name("1.0.0", &chart_body("1.0.0"))]
    );
}

#[tokio::test]
async fn chart_download_uses_repository_credentials() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/index.yaml"))
        .and(basic_auth("git", "1234"))
        .respond_with(ResponseTemplate::new(200).set_body_string(index_yaml(&["1.0.0"])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/podinfo-1.0.0.tgz"))
        .and(basic_auth("git", "1234"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(chart_body("1.0.0")))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let h = Harness::new();
    h.secrets.insert(
        "default",
        Secret::new("basic-auth").with("username", "git").with("password", "1234"),
    );
    h.apply_repository(ResourceSpec::repository(server.uri(), INTERVAL).with_secret_ref("basic-auth"));
    h.repositories.reconcile(&h.repo_key).await.unwrap();
    h.apply_chart("podinfo", None);

    assert_eq!(
        h.charts.reconcile(&h.chart_key).await.unwrap(),
        NextRun::After(INTERVAL)
    );
    assert_eq!(h.chart().status.artifact.unwrap().revision, "1.0.0");
}

#[tokio::test]
async fn chart_download_failure_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/index.yaml"))
        .respond_with(ResponseTemplate::new(200).set_body_string(index_yaml(&["1.0.0"])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let h = Harness::new();
    h.apply_repository(ResourceSpec::repository(server.uri(), INTERVAL));
    h.repositories.reconcile(&h.repo_key).await.unwrap();
    h.apply_chart("podinfo", None);

    let err = h.charts.reconcile(&h.chart_key).await.unwrap_err();
    assert!(matches!(err, ReconcileError::Transport(_)));
    assert_eq!(err.next_run(RETRY), NextRun::After(RETRY));
    assert!(h.chart().status.artifact.is_none());
    assert!(h.chart_dir_entries().is_empty());
}

#[cfg(unix)]
#[tokio::test]
async fn republished_version_is_stored_beside_the_current_file() {
    let server = MockServer::start().await;
    publish(&server, &["1.0.0"]).await;
    let h = Harness::new();
    h.apply_repository(ResourceSpec::repository(server.uri(), INTERVAL));
    h.repositories.reconcile(&h.repo_key).await.unwrap();
    h.apply_chart("podinfo", Some("1.0.0"));
    h.charts.reconcile(&h.chart_key).await.unwrap();
    let before = h.chart().status.artifact.unwrap();
    let old_file = h.root.path().join(&before.path);

    let rebuilt = b"packaged chart podinfo 1.0.0, rebuilt".to_vec();
    server.reset().await;
    Mock::given(method("GET"))
        .and(path("/podinfo-1.0.0.tgz"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(rebuilt.clone()))
        .mount(&server)
        .await;

    // A directory in place of the link makes the link swap fail after the
    // new file has been written.
    let link = h
        .root
        .path()
        .join("helmchart/default/podinfo-chart/helmchart-latest.tgz");
    fs::remove_file(&link).unwrap();
    fs::create_dir(&link).unwrap();
    fs::write(link.join("occupied"), b"x").unwrap();

    let err = h.charts.reconcile(&h.chart_key).await.unwrap_err();
    assert!(matches!(err, ReconcileError::StorageIo(_)), "{err:?}");
    let status = h.chart().status;
    assert_eq!(status.artifact.as_ref(), Some(&before));
    assert_eq!(
        status.conditions.get(ConditionType::FetchFailed).unwrap().reason,
        "StorageOperationFailed"
    );
    assert_eq!(
        srcache_core::sha256_hex(&fs::read(&old_file).unwrap()),
        before.checksum
    );

    fs::remove_dir_all(&link).unwrap();
    assert_eq!(
        h.charts.reconcile(&h.chart_key).await.unwrap(),
        NextRun::After(INTERVAL)
    );
    let after = h.chart().status.artifact.unwrap();
    assert_eq!(after.revision, "1.0.0");
    assert_ne!(after.path, before.path);
    assert_eq!(after.checksum, srcache_core::sha256_hex(&rebuilt));
    assert!(!old_file.exists());
    assert_eq!(
        h.chart_dir_entries(),
        vec!["helmchart-latest.tgz".to_string(), stored_name("1.0.0", &rebuilt)]
    );
    assert_eq!(fs::read(&link).unwrap(), rebuilt);
}
