use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hoist_cloud::command::{CommandError, CommandSpec};
use hoist_cloud::executor::CommandExecutor;
use hoist_cloud::registry::{
    self, EcrHost, GcpRepository, LIFECYCLE_POLICY, RegistryApi, RegistryClient,
    RegistryCredentials, RegistryError, RegistryKind, classify,
};
use hoist_core::user_message;
use mockall::mock;
use secrecy::ExposeSecret;
use std::sync::Mutex;
use std::time::Duration;
use tempfile::TempDir;

mock! {
    Executor {}

    impl CommandExecutor for Executor {
        async fn exec(&self, cmd: &CommandSpec) -> Result<String, CommandError>;
        async fn exec_streaming(&self, cmd: &CommandSpec) -> Result<(), CommandError>;
    }
}

fn failed(program: &str, stderr: &str) -> CommandError {
    CommandError::CommandFailed {
        program: program.to_owned(),
        args: vec![],
        stderr: stderr.to_owned(),
    }
}

fn ecr_host() -> EcrHost {
    EcrHost::parse("123456789012.dkr.ecr.us-east-1.amazonaws.com").unwrap()
}

// ── Classification ──

#[test]
fn classify_known_locations() {
    assert_eq!(classify(""), RegistryKind::DockerHub);
    assert_eq!(
        classify("123.dkr.ecr.us-west-2.amazonaws.com/x"),
        RegistryKind::Aws
    );
    assert_eq!(
        classify("123456789012.dkr.ecr.us-west-2.amazonaws.com"),
        RegistryKind::Aws
    );
    assert_eq!(classify("us-central1-docker.pkg.dev/p/r"), RegistryKind::Gcp);
    assert_eq!(classify("gcr.io/p/app"), RegistryKind::Gcp);
    assert_eq!(classify("registry.example.com/x"), RegistryKind::Unknown);
    assert_eq!(classify("localhost:5000/x"), RegistryKind::Unknown);
}

#[test]
fn classify_docker_hub_forms() {
    assert_eq!(classify("acme/web"), RegistryKind::DockerHub);
    assert_eq!(classify("web"), RegistryKind::DockerHub);
    assert_eq!(classify("docker.io/acme/web"), RegistryKind::DockerHub);
    assert_eq!(classify("https://hub.docker.com/r/acme/web"), RegistryKind::DockerHub);
}

// ── Resolution ──

/// Records which provider calls were made.
#[derive(Default)]
struct FakeApi {
    calls: Mutex<Vec<String>>,
}

impl FakeApi {
    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

impl RegistryApi for FakeApi {
    async fn ecr_credentials(&self, host: &EcrHost) -> Result<RegistryCredentials, RegistryError> {
        self.record(format!("ecr:{}", host.region));
        Ok(RegistryCredentials::new("AWS", "ecr-token"))
    }

    async fn gcp_credentials(&self) -> Result<RegistryCredentials, RegistryError> {
        self.record("gcp".to_owned());
        Ok(RegistryCredentials::new("oauth2accesstoken", "gcp-token"))
    }

    async fn local_credentials(
        &self,
        host: &str,
    ) -> Result<Option<RegistryCredentials>, RegistryError> {
        self.record(format!("local:{host}"));
        Ok(None)
    }

    async fn ensure_ecr_repository(
        &self,
        host: &EcrHost,
        repository: &str,
    ) -> Result<(), RegistryError> {
        self.record(format!("ensure-ecr:{}:{repository}", host.account_id));
        Ok(())
    }

    async fn ensure_gcp_repository(&self, repository: &GcpRepository) -> Result<(), RegistryError> {
        self.record(format!("ensure-gcp:{}", repository.repository));
        Ok(())
    }
}

#[tokio::test]
async fn project_credentials_take_precedence() {
    let api = FakeApi::default();
    let registry = registry::resolve(
        &api,
        "123456789012.dkr.ecr.us-east-1.amazonaws.com/proj_1",
        Some(RegistryCredentials::new("managed", "secret")),
    )
    .await
    .unwrap();

    assert_eq!(registry.kind, RegistryKind::ProjectManaged);
    assert_eq!(registry.credentials.unwrap().username, "managed");
    assert!(api.calls().is_empty());
}

#[tokio::test]
async fn ecr_resolution_and_provisioning() {
    let api = FakeApi::default();
    let registry = registry::resolve(
        &api,
        "123456789012.dkr.ecr.us-east-1.amazonaws.com/team/web",
        None,
    )
    .await
    .unwrap();

    assert_eq!(registry.kind, RegistryKind::Aws);
    assert_eq!(registry.host, "123456789012.dkr.ecr.us-east-1.amazonaws.com");
    assert_eq!(
        registry.credentials.as_ref().unwrap().password.expose_secret(),
        "ecr-token"
    );

    registry::ensure_repository(&api, &registry).await.unwrap();
    assert_eq!(
        api.calls(),
        vec!["ecr:us-east-1", "ensure-ecr:123456789012:team/web"]
    );
}

#[tokio::test]
async fn gcp_resolution_and_provisioning() {
    let api = FakeApi::default();
    let registry = registry::resolve(&api, "europe-west1-docker.pkg.dev/p/apps/web", None)
        .await
        .unwrap();
    registry::ensure_repository(&api, &registry).await.unwrap();

    assert_eq!(registry.kind, RegistryKind::Gcp);
    assert_eq!(api.calls(), vec!["gcp", "ensure-gcp:apps"]);
}

#[tokio::test]
async fn docker_hub_uses_local_store_and_skips_provisioning() {
    let api = FakeApi::default();
    let registry = registry::resolve(&api, "acme/web", None).await.unwrap();
    registry::ensure_repository(&api, &registry).await.unwrap();

    assert_eq!(registry.kind, RegistryKind::DockerHub);
    assert!(registry.credentials.is_none());
    assert_eq!(api.calls(), vec!["local:docker.io"]);
}

// ── RegistryClient: AWS ──

#[tokio::test]
async fn ecr_credentials_use_aws_cli() {
    let mut mock = MockExecutor::new();
    mock.expect_exec()
        .withf(|cmd| {
            cmd.program == "aws"
                && cmd.args[..2] == ["ecr", "get-login-password"]
                && cmd.value_of("--region") == Some("us-east-1")
        })
        .returning(|_| Ok("eyJwYXlsb2Fk\n".to_owned()));

    let creds = RegistryClient::with_executor(mock)
        .ecr_credentials(&ecr_host())
        .await
        .unwrap();
    assert_eq!(creds.username, "AWS");
    assert_eq!(creds.password.expose_secret(), "eyJwYXlsb2Fk");
}

#[tokio::test]
async fn ecr_repository_already_existing_still_gets_policy() {
    let mut mock = MockExecutor::new();
    mock.expect_exec()
        .withf(|cmd| cmd.has_arg("create-repository"))
        .times(1)
        .returning(|_| {
            Err(failed(
                "aws",
                "An error occurred (RepositoryAlreadyExistsException) when calling the CreateRepository operation",
            ))
        });
    mock.expect_exec()
        .withf(|cmd| {
            cmd.has_arg("put-lifecycle-policy")
                && cmd.value_of("--repository-name") == Some("team/web")
                && cmd.value_of("--registry-id") == Some("123456789012")
                && cmd.value_of("--lifecycle-policy-text") == Some(LIFECYCLE_POLICY)
        })
        .times(1)
        .returning(|_| Ok("{}".to_owned()));

    RegistryClient::with_executor(mock)
        .ensure_ecr_repository(&ecr_host(), "team/web")
        .await
        .unwrap();
}

#[tokio::test]
async fn ecr_repository_other_failure_is_fatal() {
    let mut mock = MockExecutor::new();
    mock.expect_exec()
        .withf(|cmd| cmd.has_arg("create-repository"))
        .returning(|_| Err(failed("aws", "AccessDeniedException")));

    let err = RegistryClient::with_executor(mock)
        .ensure_ecr_repository(&ecr_host(), "team/web")
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::CreateRepository { .. }));
}

// ── RegistryClient: GCP ──

#[tokio::test]
async fn gcp_credentials_fall_back_to_gcloud() {
    let mut mock = MockExecutor::new();
    mock.expect_exec()
        .withf(|cmd| cmd.program == "gcloud" && cmd.has_arg("print-access-token"))
        .returning(|_| Ok("ya29.token\n".to_owned()));

    let creds = RegistryClient::with_executor(mock)
        .gcp_credentials()
        .await
        .unwrap();
    assert_eq!(creds.username, "oauth2accesstoken");
    assert_eq!(creds.password.expose_secret(), "ya29.token");
}

#[tokio::test]
async fn gcp_credentials_missing_is_user_error() {
    let mut mock = MockExecutor::new();
    mock.expect_exec()
        .returning(|_| Err(failed("gcloud", "ERROR: (gcloud.auth.print-access-token) no credentialed accounts")));

    let err = RegistryClient::with_executor(mock)
        .gcp_credentials()
        .await
        .unwrap_err();
    assert_eq!(
        user_message(&err),
        Some("Could not find GCP credentials. Did you forget to run `gcloud auth login`?")
    );
}

#[tokio::test(start_paused = true)]
async fn gcp_repository_creation_polls_until_done() {
    let mut mock = MockExecutor::new();
    mock.expect_exec()
        .withf(|cmd| {
            cmd.args[..3] == ["artifacts", "repositories", "create"]
                && cmd.value_of("--location") == Some("us-central1")
                && cmd.value_of("--project") == Some("p")
                && cmd.has_arg("--async")
        })
        .times(1)
        .returning(|_| Ok(r#"{"name": "projects/p/locations/us-central1/operations/op1"}"#.to_owned()));

    let mut polls = 0;
    mock.expect_exec()
        .withf(|cmd| cmd.args[..3] == ["artifacts", "operations", "describe"])
        .times(2)
        .returning(move |_| {
            polls += 1;
            let done = polls > 1;
            Ok(format!(
                r#"{{"name": "projects/p/locations/us-central1/operations/op1", "done": {done}}}"#
            ))
        });

    let repo = GcpRepository::parse("us-central1-docker.pkg.dev/p/apps").unwrap();
    RegistryClient::with_executor(mock)
        .poll_interval(Duration::from_secs(1), 10)
        .ensure_gcp_repository(&repo)
        .await
        .unwrap();
}

#[tokio::test]
async fn gcp_repository_already_exists_is_ok() {
    let mut mock = MockExecutor::new();
    mock.expect_exec()
        .times(1)
        .returning(|_| Err(failed("gcloud", "ALREADY_EXISTS: the repository already exists")));

    let repo = GcpRepository::parse("us-central1-docker.pkg.dev/p/apps").unwrap();
    RegistryClient::with_executor(mock)
        .ensure_gcp_repository(&repo)
        .await
        .unwrap();
}

// ── RegistryClient: local credential store ──

#[tokio::test]
async fn local_credentials_from_inline_auth() {
    let tmp = TempDir::new().unwrap();
    let auth = STANDARD.encode("alice:hunter2");
    std::fs::write(
        tmp.path().join("config.json"),
        format!(r#"{{"auths": {{"ghcr.io": {{"auth": "{auth}"}}}}}}"#),
    )
    .unwrap();

    let client = RegistryClient::with_executor(MockExecutor::new())
        .docker_config_dir(Some(tmp.path().to_path_buf()));
    let creds = client.local_credentials("ghcr.io").await.unwrap().unwrap();
    assert_eq!(creds.username, "alice");
    assert_eq!(creds.password.expose_secret(), "hunter2");
}

#[tokio::test]
async fn local_credentials_from_helper() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(tmp.path().join("config.json"), r#"{"credsStore": "desktop"}"#).unwrap();

    let mut mock = MockExecutor::new();
    mock.expect_exec()
        .withf(|cmd| {
            cmd.program == "docker-credential-desktop"
                && cmd.args == ["get"]
                && cmd.stdin.as_deref() == Some(b"https://index.docker.io/v1/".as_slice())
        })
        .returning(|_| {
            Ok(r#"{"ServerURL": "https://index.docker.io/v1/", "Username": "bob", "Secret": "pat"}"#
                .to_owned())
        });

    let client =
        RegistryClient::with_executor(mock).docker_config_dir(Some(tmp.path().to_path_buf()));
    let creds = client.local_credentials("docker.io").await.unwrap().unwrap();
    assert_eq!(creds.username, "bob");
}

#[tokio::test]
async fn local_credentials_missing_config_is_none() {
    let tmp = TempDir::new().unwrap();
    let client = RegistryClient::with_executor(MockExecutor::new())
        .docker_config_dir(Some(tmp.path().to_path_buf()));
    assert!(client.local_credentials("ghcr.io").await.unwrap().is_none());
}
