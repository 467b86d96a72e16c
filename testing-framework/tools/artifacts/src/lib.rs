use std::{
    fs, io,
    path::{Path, PathBuf},
};

use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info, warn};

/// File name the artifact is deployed under unless configured otherwise.
pub const DEFAULT_TARGET_NAME: &str = "ROOT.war";

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("failed to prepare deployment directory {path}: {reason}")]
    Preparation {
        path: PathBuf,
        reason: String,
        #[source]
        source: Option<io::Error>,
    },
    #[error("no file ending in '{suffix}' found in {dir}")]
    NotFound {
        dir: PathBuf,
        suffix: String,
        #[source]
        source: Option<io::Error>,
    },
    #[error("failed to deploy {artifact} to {destination}: {source}")]
    Deployment {
        artifact: PathBuf,
        destination: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ArtifactError {
    fn preparation(path: &Path, source: io::Error) -> Self {
        Self::Preparation {
            path: path.to_path_buf(),
            reason: source.to_string(),
            source: Some(source),
        }
    }

    fn deployment(artifact: &Path, destination: &Path, source: io::Error) -> Self {
        Self::Deployment {
            artifact: artifact.to_path_buf(),
            destination: destination.to_path_buf(),
            source,
        }
    }
}

/// Remove `dir` and everything in it, then recreate it empty.
pub fn prepare(dir: &Path) -> Result<(), ArtifactError> {
    match fs::remove_dir_all(dir) {
        Ok(()) => debug!(dir = %dir.display(), "removed existing deployment directory"),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => return Err(ArtifactError::preparation(dir, err)),
    }
    fs::create_dir_all(dir).map_err(|err| ArtifactError::preparation(dir, err))?;

    let mut entries = fs::read_dir(dir).map_err(|err| ArtifactError::preparation(dir, err))?;
    if entries.next().is_some() {
        return Err(ArtifactError::Preparation {
            path: dir.to_path_buf(),
            reason: "directory is not empty after recreation".into(),
            source: None,
        });
    }
    Ok(())
}

/// First regular file directly inside `search_dir` whose name ends with
/// `suffix`. Listing order is whatever the filesystem returns.
pub fn locate_artifact(search_dir: &Path, suffix: &str) -> Result<PathBuf, ArtifactError> {
    let not_found = |source| ArtifactError::NotFound {
        dir: search_dir.to_path_buf(),
        suffix: suffix.to_owned(),
        source,
    };

    let entries = fs::read_dir(search_dir).map_err(|err| not_found(Some(err)))?;
    let mut matches = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| not_found(Some(err)))?;
        let is_file = entry.file_type().is_ok_and(|kind| kind.is_file());
        if is_file && entry.file_name().to_string_lossy().ends_with(suffix) {
            matches.push(entry.path());
        }
    }

    let mut candidates = matches.into_iter();
    let first = candidates.next().ok_or_else(|| not_found(None))?;
    let others: Vec<_> = candidates.collect();
    if !others.is_empty() {
        warn!(
            chosen = %first.display(),
            ignored = ?others,
            suffix,
            "several artifacts match; using the first listed"
        );
    }
    Ok(first)
}

/// Copy `artifact` to `destination`, replacing any existing file.
///
/// The bytes go to a temporary file next to the destination which is then
/// renamed over it, so a failure never leaves a truncated destination.
pub fn deploy(artifact: &Path, destination: &Path) -> Result<(), ArtifactError> {
    let dir = destination
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let fail = |err| ArtifactError::deployment(artifact, destination, err);

    let mut source = fs::File::open(artifact).map_err(fail)?;
    let mut staged = NamedTempFile::new_in(dir).map_err(fail)?;
    let bytes = io::copy(&mut source, staged.as_file_mut()).map_err(fail)?;
    staged.as_file().sync_all().map_err(fail)?;
    staged
        .persist(destination)
        .map_err(|err| fail(err.error))?;

    info!(
        artifact = %artifact.display(),
        destination = %destination.display(),
        bytes,
        "artifact deployed"
    );
    Ok(())
}

/// Locate the artifact, reset `dest_dir`, and deploy under
/// [`DEFAULT_TARGET_NAME`]. Returns the deployed path.
pub fn prepare_and_deploy(
    search_dir: &Path,
    suffix: &str,
    dest_dir: &Path,
) -> Result<PathBuf, ArtifactError> {
    ArtifactDeployer::new(dest_dir).prepare_and_deploy(search_dir, suffix)
}

/// A deployment directory that receives one artifact under a fixed name.
#[derive(Clone, Debug)]
pub struct ArtifactDeployer {
    deployment_dir: PathBuf,
    target_name: String,
}

impl ArtifactDeployer {
    pub fn new(deployment_dir: impl Into<PathBuf>) -> Self {
        Self {
            deployment_dir: deployment_dir.into(),
            target_name: DEFAULT_TARGET_NAME.to_owned(),
        }
    }

    #[must_use]
    pub fn with_target_name(mut self, name: impl Into<String>) -> Self {
        self.target_name = name.into();
        self
    }

    #[must_use]
    pub fn deployment_dir(&self) -> &Path {
        &self.deployment_dir
    }

    #[must_use]
    pub fn target_path(&self) -> PathBuf {
        self.deployment_dir.join(&self.target_name)
    }

    pub fn prepare(&self) -> Result<(), ArtifactError> {
        prepare(&self.deployment_dir)
    }

    pub fn deploy(&self, artifact: &Path) -> Result<PathBuf, ArtifactError> {
        let target = self.target_path();
        deploy(artifact, &target)?;
        Ok(target)
    }

    /// The artifact is located before the directory is reset, so a missing
    /// build leaves the previous deployment untouched.
    pub fn prepare_and_deploy(
        &self,
        search_dir: &Path,
        suffix: &str,
    ) -> Result<PathBuf, ArtifactError> {
        let artifact = locate_artifact(search_dir, suffix)?;
        self.prepare()?;
        self.deploy(&artifact)
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn write(dir: &Path, name: &str, contents: &[u8]) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, contents).expect("write fixture");
        path
    }

    #[test]
    fn prepare_empties_an_existing_directory() {
        let root = TempDir::new().expect("tempdir");
        let dir = root.path().join("webapps");
        fs::create_dir_all(dir.join("old-app/WEB-INF")).expect("nested dirs");
        write(&dir, "stale.war", b"stale");

        prepare(&dir).expect("prepare");

        assert!(dir.is_dir());
        assert_eq!(fs::read_dir(&dir).expect("list").count(), 0);
    }

    #[test]
    fn prepare_creates_a_missing_directory() {
        let root = TempDir::new().expect("tempdir");
        let dir = root.path().join("a/b/webapps");

        prepare(&dir).expect("prepare");
        assert!(dir.is_dir());
    }

    #[test]
    fn prepare_over_a_file_fails() {
        let root = TempDir::new().expect("tempdir");
        let path = write(root.path(), "webapps", b"not a directory");

        let err = prepare(&path).expect_err("cannot reset a file");
        assert!(matches!(err, ArtifactError::Preparation { .. }));
    }

    #[test]
    fn locate_picks_the_matching_suffix() {
        let dir = TempDir::new().expect("tempdir");
        write(dir.path(), "app.txt", b"notes");
        let war = write(dir.path(), "app.war", b"bundle");

        assert_eq!(locate_artifact(dir.path(), ".war").expect("found"), war);
    }

    #[test]
    fn locate_ignores_directories_and_nested_files() {
        let dir = TempDir::new().expect("tempdir");
        fs::create_dir(dir.path().join("exploded.war")).expect("dir");
        fs::create_dir(dir.path().join("nested")).expect("dir");
        write(&dir.path().join("nested"), "deep.war", b"bundle");
        write(dir.path(), "app.txt", b"notes");

        let err = locate_artifact(dir.path(), ".war").expect_err("no top-level war");
        assert!(matches!(err, ArtifactError::NotFound { suffix, .. } if suffix == ".war"));
    }

    #[test]
    fn locate_in_missing_directory_is_not_found() {
        let err = locate_artifact(Path::new("/nonexistent/target"), ".war").expect_err("missing");
        assert!(matches!(err, ArtifactError::NotFound { source: Some(_), .. }));
    }

    #[test]
    fn locate_with_several_matches_returns_one_of_them() {
        let dir = TempDir::new().expect("tempdir");
        let first = write(dir.path(), "a.war", b"a");
        let second = write(dir.path(), "b.war", b"b");

        let found = locate_artifact(dir.path(), ".war").expect("found");
        assert!(found == first || found == second);
    }

    #[test]
    fn deploy_overwrites_existing_destination() {
        let dir = TempDir::new().expect("tempdir");
        let artifact = write(dir.path(), "app.war", &[0xCA, 0xFE, 0xBA, 0xBE, 0x00, 0x01]);
        let destination = write(dir.path(), "ROOT.war", b"previous deployment, longer");

        deploy(&artifact, &destination).expect("deploy");

        assert_eq!(
            fs::read(&destination).expect("read"),
            [0xCA, 0xFE, 0xBA, 0xBE, 0x00, 0x01]
        );
    }

    #[test]
    fn deploy_of_missing_artifact_leaves_destination_alone() {
        let dir = TempDir::new().expect("tempdir");
        let destination = write(dir.path(), "ROOT.war", b"previous");

        let err = deploy(&dir.path().join("missing.war"), &destination).expect_err("missing");

        assert!(matches!(err, ArtifactError::Deployment { .. }));
        assert_eq!(fs::read(&destination).expect("read"), b"previous");
    }

    #[test]
    fn deploy_into_missing_directory_fails() {
        let dir = TempDir::new().expect("tempdir");
        let artifact = write(dir.path(), "app.war", b"bundle");

        let err = deploy(&artifact, &dir.path().join("absent/ROOT.war")).expect_err("no dir");
        assert!(matches!(err, ArtifactError::Deployment { .. }));
    }

    #[test]
    fn prepare_and_deploy_replaces_the_previous_deployment() {
        let build = TempDir::new().expect("build dir");
        write(build.path(), "service-1.0.war", b"new build");
        write(build.path(), "service-1.0.pom", b"<project/>");

        let webapps = TempDir::new().expect("webapps");
        write(webapps.path(), "ROOT.war", b"old build");
        write(webapps.path(), "leftover.log", b"log");

        let deployed =
            prepare_and_deploy(build.path(), ".war", webapps.path()).expect("deployed");

        assert_eq!(deployed, webapps.path().join(DEFAULT_TARGET_NAME));
        assert_eq!(fs::read(&deployed).expect("read"), b"new build");
        assert_eq!(fs::read_dir(webapps.path()).expect("list").count(), 1);
    }

    #[test]
    fn missing_build_keeps_previous_deployment() {
        let build = TempDir::new().expect("build dir");
        let webapps = TempDir::new().expect("webapps");
        write(webapps.path(), "ROOT.war", b"old build");

        let deployer = ArtifactDeployer::new(webapps.path()).with_target_name("app.war");
        let err = deployer
            .prepare_and_deploy(build.path(), ".war")
            .expect_err("nothing to deploy");

        assert!(matches!(err, ArtifactError::NotFound { .. }));
        assert!(webapps.path().join("ROOT.war").exists());
    }
}
