//! Environment probes deciding which integration suites can run.

use std::path::Path;
use std::process::Command;

const DEFAULT_DOCKER_SOCKET: &str = "/var/run/docker.sock";

/// Whether a Docker daemon looks reachable for container-backed suites.
#[must_use]
pub fn docker_available() -> bool {
    probe_docker(std::env::var("DOCKER_HOST").ok().as_deref())
}

fn probe_docker(host: Option<&str>) -> bool {
    match host {
        Some(host) => host
            .strip_prefix("unix://")
            .is_none_or(|socket| Path::new(socket).exists()),
        None => {
            Path::new(DEFAULT_DOCKER_SOCKET).exists()
                || Command::new("docker")
                    .arg("info")
                    .output()
                    .is_ok_and(|output| output.status.success())
        }
    }
}
