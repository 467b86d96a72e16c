use std::{
    collections::HashSet,
    fs, io,
    path::{Path, PathBuf},
    time::Duration,
};

use reqwest::Url;
use serde::Deserialize;
use testing_framework_core::{
    adjust_timeout,
    constants::DEFAULT_READINESS_TIMEOUT,
    readiness::{EndpointError, parse_endpoint},
};

use crate::docker::ComposeFile;

/// Errors loading or validating a stack descriptor.
#[derive(Debug, thiserror::Error)]
pub enum DescriptorError {
    #[error("failed to read stack descriptor {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse stack descriptor: {source}")]
    Parse {
        #[source]
        source: serde_yaml::Error,
    },
    #[error("service '{name}' is declared more than once")]
    DuplicateService { name: String },
    #[error("stack descriptor contains a service with an empty name")]
    EmptyServiceName,
    #[error("service '{service}' has an invalid health endpoint: {source}")]
    Endpoint {
        service: String,
        #[source]
        source: EndpointError,
    },
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawStack {
    compose_file: PathBuf,
    #[serde(default)]
    project: Option<String>,
    #[serde(default)]
    working_dir: Option<PathBuf>,
    #[serde(default = "default_readiness_timeout_secs")]
    readiness_timeout_secs: u64,
    #[serde(default)]
    services: Vec<RawService>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawService {
    name: String,
    #[serde(default)]
    health: Option<String>,
}

const fn default_readiness_timeout_secs() -> u64 {
    DEFAULT_READINESS_TIMEOUT.as_secs()
}

/// One compose service and the endpoint that reports it healthy.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceDescriptor {
    name: String,
    health: Option<Url>,
}

impl ServiceDescriptor {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `None` for services nothing needs to wait on.
    #[must_use]
    pub const fn health(&self) -> Option<&Url> {
        self.health.as_ref()
    }
}

/// A compose file plus the ordered set of services that must come up.
///
/// ```yaml
/// compose_file: docker-compose.yml
/// readiness_timeout_secs: 60
/// services:
///   - name: search
///     health: http://127.0.0.1:9200/
///   - name: cache
///     health: "6380"
/// ```
///
/// Relative paths resolve against the directory holding the descriptor.
#[derive(Clone, Debug)]
pub struct StackDescriptor {
    compose_file: PathBuf,
    project: Option<String>,
    working_dir: PathBuf,
    readiness_timeout: Duration,
    services: Vec<ServiceDescriptor>,
}

impl StackDescriptor {
    pub fn load(path: &Path) -> Result<Self, DescriptorError> {
        let contents = fs::read_to_string(path).map_err(|source| DescriptorError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        Self::from_yaml_str(&contents, base_dir)
    }

    pub fn from_yaml_str(contents: &str, base_dir: &Path) -> Result<Self, DescriptorError> {
        let raw: RawStack =
            serde_yaml::from_str(contents).map_err(|source| DescriptorError::Parse { source })?;

        let mut seen = HashSet::new();
        let mut services = Vec::with_capacity(raw.services.len());
        for service in raw.services {
            let name = service.name.trim().to_owned();
            if name.is_empty() {
                return Err(DescriptorError::EmptyServiceName);
            }
            if !seen.insert(name.clone()) {
                return Err(DescriptorError::DuplicateService { name });
            }
            let health = service
                .health
                .as_deref()
                .map(parse_endpoint)
                .transpose()
                .map_err(|source| DescriptorError::Endpoint {
                    service: name.clone(),
                    source,
                })?;
            services.push(ServiceDescriptor { name, health });
        }

        let working_dir = raw
            .working_dir
            .map_or_else(|| base_dir.to_path_buf(), |dir| base_dir.join(dir));

        Ok(Self {
            compose_file: base_dir.join(raw.compose_file),
            project: raw.project.filter(|project| !project.trim().is_empty()),
            working_dir,
            readiness_timeout: Duration::from_secs(raw.readiness_timeout_secs),
            services,
        })
    }

    #[must_use]
    pub fn compose_path(&self) -> &Path {
        &self.compose_file
    }

    /// Compose invocation target; a random project name is generated when the
    /// descriptor does not pin one.
    #[must_use]
    pub fn compose_file(&self) -> ComposeFile {
        let file = ComposeFile::new(&self.compose_file).with_working_dir(&self.working_dir);
        match &self.project {
            Some(project) => file.with_project(project),
            None => file,
        }
    }

    #[must_use]
    pub fn services(&self) -> &[ServiceDescriptor] {
        &self.services
    }

    pub fn service_names(&self) -> impl Iterator<Item = &str> {
        self.services.iter().map(ServiceDescriptor::name)
    }

    /// Health endpoints in declaration order.
    #[must_use]
    pub fn endpoints(&self) -> Vec<Url> {
        self.services
            .iter()
            .filter_map(|service| service.health.clone())
            .collect()
    }

    /// Configured timeout, scaled by `SLOW_TEST_ENV`.
    #[must_use]
    pub fn readiness_timeout(&self) -> Duration {
        adjust_timeout(self.readiness_timeout)
    }
}
