//! End-to-end bootstrap tests against a scripted fake backend that connects
//! back over the rendezvous socket, like the real one does.

#![cfg(unix)]

use std::{os::unix::fs::PermissionsExt, path::Path, path::PathBuf, time::Duration};

use backend_bootstrap::{
    bootstrap::{self, BootstrapConfig},
    error::Error,
    launcher::LaunchOptions,
};
use tokio::time::timeout;

/// Writes an executable bash script that plays the backend role.
fn write_backend_script(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("fake-backend.sh");
    std::fs::write(&path, format!("#!/bin/bash\n{body}\n")).unwrap();
    let mut permissions = std::fs::metadata(&path).unwrap().permissions();
    permissions.set_mode(0o755);
    std::fs::set_permissions(&path, permissions).unwrap();
    path
}

/// Script prologue that extracts the rendezvous port from argv the way the
/// real backend does.
const PARSE_PORT: &str = r#"
port=""
while [ $# -gt 0 ]; do
  if [ "$1" = "--frontend-service-socket-port" ]; then
    port="$2"; shift 2
  else
    shift
  fi
done
"#;

#[tokio::test]
async fn bootstrap_resolves_parameters_from_the_handshake() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_backend_script(
        dir.path(),
        &format!(
            r#"{PARSE_PORT}
exec 3<>"/dev/tcp/127.0.0.1/$port"
printf '{{"webServerPort": 45991}}' >&3
exec 3>&-
"#
        ),
    );

    let config = BootstrapConfig::new(script);
    let backend = timeout(Duration::from_secs(10), bootstrap::start(&config))
        .await
        .expect("bootstrap within timeout")
        .unwrap();

    assert_eq!(backend.parameters.web_server_port, 45991);
    assert_eq!(backend.parameters.web_server_certificate, "");
    assert_eq!(backend.parameters.web_server_url(), "http://127.0.0.1:45991");

    // The script exits right after sending; the close notification must
    // arrive exactly once.
    let mut close = backend.handle.close_signal();
    timeout(Duration::from_secs(10), close.wait())
        .await
        .expect("close signal after backend exit");
    assert!(close.is_closed());
}

#[tokio::test]
async fn bootstrap_loads_credential_files_named_by_the_handshake() {
    let dir = tempfile::tempdir().unwrap();
    let cert_path = dir.path().join("cert.pem");
    std::fs::write(&cert_path, "CERT-BYTES").unwrap();
    let passphrase_path = dir.path().join("passphrase");
    std::fs::write(&passphrase_path, "sesame").unwrap();

    // The message is delivered in two chunks with a pause in between, which
    // also exercises reassembly end to end.
    let script = write_backend_script(
        dir.path(),
        &format!(
            r#"{PARSE_PORT}
exec 3<>"/dev/tcp/127.0.0.1/$port"
printf '{{"webServerPort": 45992, "webServerCertificatePath": "{cert}",' >&3
sleep 0.1
printf ' "passphrasePath": "{passphrase}"}}' >&3
exec 3>&-
"#,
            cert = cert_path.display(),
            passphrase = passphrase_path.display(),
        ),
    );

    let config = BootstrapConfig {
        executable: script,
        preferred_rendezvous_port: 0,
        launch: LaunchOptions {
            log_level: Some("debug".to_string()),
            log_to_console: true,
            ..LaunchOptions::default()
        },
    };

    let backend = timeout(Duration::from_secs(10), bootstrap::start(&config))
        .await
        .expect("bootstrap within timeout")
        .unwrap();

    assert_eq!(backend.parameters.web_server_port, 45992);
    assert_eq!(backend.parameters.web_server_certificate, "CERT-BYTES");
    assert_eq!(backend.parameters.passphrase, "sesame");
    assert_eq!(backend.parameters.web_server_url(), "https://127.0.0.1:45992");
}

#[tokio::test]
async fn backend_exiting_before_connecting_fails_the_bootstrap() {
    let config = BootstrapConfig::new("/bin/true");
    let err = timeout(Duration::from_secs(10), bootstrap::start(&config))
        .await
        .expect("bootstrap fails promptly")
        .unwrap_err();
    assert!(matches!(err, Error::Connection { .. }));
}

#[tokio::test]
async fn missing_executable_is_a_spawn_error() {
    let config = BootstrapConfig::new("/nonexistent/backend-binary");
    let err = bootstrap::start(&config).await.unwrap_err();
    assert!(matches!(err, Error::Spawn { .. }));
}

#[tokio::test]
async fn caller_timeout_abandons_a_pending_handshake() {
    let dir = tempfile::tempdir().unwrap();
    // A backend that never connects back.
    let script = write_backend_script(dir.path(), "sleep 5");

    let config = BootstrapConfig::new(script);
    let result = timeout(Duration::from_millis(400), bootstrap::start(&config)).await;

    // The timeout fires first; dropping the bootstrap future abandons the
    // handshake with no side effects.
    assert!(result.is_err());
}
