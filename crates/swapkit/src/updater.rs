use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use swapkit_core::{
    DownloadProgress, GitHubRelease, GitHubReleaseClient, GitLabReleaseClient, GitLabTag,
    ProgressCallback, ReleaseProvider, Version,
};
use swapkit_ledger::{ActionLedger, HelperExecutable, LaunchHandle, LaunchOptions};

use crate::error::AppError;
use crate::settings::{AppSettings, ProviderKind, ProxySetting};

const HELPER_NAME: &str = "swapkit-executor";
const UNKNOWN_SIZE_STEP: u64 = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetLink {
    pub name: String,
    pub url: String,
}

/// Provider-neutral view of a newer release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseSummary {
    pub tag: String,
    pub title: Option<String>,
    pub prerelease: bool,
    pub assets: Vec<AssetLink>,
}

impl From<GitHubRelease> for ReleaseSummary {
    fn from(release: GitHubRelease) -> Self {
        Self {
            tag: release.tag_name,
            title: release.name.filter(|name| !name.is_empty()),
            prerelease: release.prerelease,
            assets: release
                .assets
                .into_iter()
                .map(|asset| AssetLink {
                    name: asset.name,
                    url: asset.browser_download_url,
                })
                .collect(),
        }
    }
}

impl From<GitLabTag> for ReleaseSummary {
    fn from(tag: GitLabTag) -> Self {
        Self {
            title: tag.message.filter(|message| !message.is_empty()),
            tag: tag.name,
            prerelease: false,
            assets: Vec::new(),
        }
    }
}

pub enum Provider {
    GitHub(GitHubReleaseClient),
    GitLab(GitLabReleaseClient),
}

impl Provider {
    /// # Errors
    /// Returns [`AppError::NotConfigured`] when the repository is not set and
    /// [`AppError::Transport`] for an unusable token or proxy.
    pub fn from_settings(settings: &AppSettings) -> Result<Self, AppError> {
        let proxy = settings
            .proxy
            .as_ref()
            .filter(|proxy| !proxy.address.trim().is_empty())
            .map(ProxySetting::to_proxy_settings);

        match settings.provider {
            ProviderKind::GitHub => {
                if settings.github_owner.trim().is_empty() || settings.github_repo.trim().is_empty()
                {
                    return Err(AppError::NotConfigured(
                        "github_owner and github_repo are required",
                    ));
                }
                let mut client = GitHubReleaseClient::new();
                client
                    .set_base_url(&settings.github_api_url)
                    .set_repo(&settings.github_owner, &settings.github_repo)
                    .set_max_releases(settings.max_releases)
                    .set_timeouts(settings.http_timeout(), settings.read_timeout())
                    .set_buffer_size(settings.buffer_size);
                client.set_proxy(proxy)?;
                if let Some(token) = settings.token() {
                    client.set_authorization_token(token)?;
                }
                Ok(Self::GitHub(client))
            }
            ProviderKind::GitLab => {
                if settings.gitlab_project_id.trim().is_empty() {
                    return Err(AppError::NotConfigured("gitlab_project_id is required"));
                }
                let mut client = GitLabReleaseClient::new(&settings.gitlab_base_url);
                client
                    .set_project_id(&settings.gitlab_project_id)
                    .set_max_tags(settings.max_releases)
                    .set_timeouts(settings.http_timeout(), settings.read_timeout())
                    .set_buffer_size(settings.buffer_size);
                client.set_proxy(proxy)?;
                if let Some(token) = settings.token() {
                    client.set_private_token(token)?;
                }
                Ok(Self::GitLab(client))
            }
        }
    }

    /// Releases newer than `current`, newest first.
    ///
    /// # Errors
    /// Returns the provider error when the listing fails or a tag is not a
    /// version.
    pub async fn newer_releases(
        &mut self,
        current: &Version,
    ) -> Result<Vec<ReleaseSummary>, AppError> {
        let releases: Vec<ReleaseSummary> = match self {
            Self::GitHub(client) => client
                .fetch_new_releases_since(current)
                .await?
                .into_iter()
                .map(ReleaseSummary::from)
                .collect(),
            Self::GitLab(client) => client
                .fetch_new_releases_since(current)
                .await?
                .into_iter()
                .map(ReleaseSummary::from)
                .collect(),
        };
        Ok(releases)
    }

    /// Download the executable for `release` into a temporary file. Only
    /// GitHub releases carry executables; a GitLab tag only has a source
    /// archive, which must never replace the running binary.
    ///
    /// # Errors
    /// Returns [`AppError::NoAsset`] when a GitHub release has nothing to
    /// download, [`AppError::SourceArchiveOnly`] for GitLab, or the provider
    /// error when the transfer fails.
    pub async fn download(
        &self,
        release: &ReleaseSummary,
        preferred_asset: Option<&str>,
    ) -> Result<PathBuf, AppError> {
        let mut progress = ProgressLog::default();
        let mut on_progress = |update: DownloadProgress| {
            progress.record(update);
        };
        let callback: ProgressCallback<'_> = &mut on_progress;

        match self {
            Self::GitHub(client) => {
                let asset = select_asset(&release.assets, preferred_asset).ok_or_else(|| {
                    AppError::NoAsset {
                        tag: release.tag.clone(),
                    }
                })?;
                info!("Downloading asset {} of {}", asset.name, release.tag);
                Ok(client
                    .download_to_temp_file(&asset.url, Some(callback))
                    .await?)
            }
            Self::GitLab(_) => Err(AppError::SourceArchiveOnly {
                tag: release.tag.clone(),
            }),
        }
    }
}

/// Platform asset name for a release tag, e.g. `swapkit-1.4.0-linux-x64`.
#[must_use]
pub fn asset_name(tag: &str) -> Option<String> {
    asset_name_for(tag, std::env::consts::OS, std::env::consts::ARCH)
}

fn asset_name_for(tag: &str, os: &str, arch: &str) -> Option<String> {
    let version = tag.trim().trim_start_matches(['v', 'V']);
    let name = match (os, arch) {
        ("macos", "aarch64") => format!("swapkit-{version}-macos-arm64"),
        ("macos", "x86_64") => format!("swapkit-{version}-macos-x64"),
        ("linux", "x86_64") => format!("swapkit-{version}-linux-x64"),
        ("linux", "aarch64") => format!("swapkit-{version}-linux-arm64"),
        ("windows", "x86_64") => format!("swapkit-{version}-windows-x64.exe"),
        ("windows", "aarch64") => format!("swapkit-{version}-windows-arm64.exe"),
        _ => return None,
    };
    Some(name)
}

/// Asset named `preferred` (ignoring ASCII case), otherwise the first one.
#[must_use]
pub fn select_asset<'a>(assets: &'a [AssetLink], preferred: Option<&str>) -> Option<&'a AssetLink> {
    preferred
        .and_then(|name| {
            assets
                .iter()
                .find(|asset| asset.name.eq_ignore_ascii_case(name))
        })
        .or_else(|| assets.first())
}

/// Logs download progress in steps of ten percent, or per MiB when the
/// size is unknown.
#[derive(Debug, Default)]
struct ProgressLog {
    last_step: Option<u64>,
}

impl ProgressLog {
    fn record(&mut self, progress: DownloadProgress) -> bool {
        let step = if progress.total > 0 {
            (progress.done.min(progress.total) * 10) / progress.total
        } else {
            progress.done / UNKNOWN_SIZE_STEP
        };
        if self.last_step == Some(step) {
            return false;
        }
        self.last_step = Some(step);

        if progress.total > 0 {
            info!(
                "Downloaded {}% ({} of {} bytes)",
                step * 10,
                progress.done,
                progress.total
            );
        } else {
            info!("Downloaded {} bytes", progress.done);
        }
        true
    }
}

/// Version of the running binary.
///
/// # Errors
/// Returns [`AppError::CurrentVersion`] if the package version is not
/// usable as a four-component version.
pub fn current_version() -> Result<Version, AppError> {
    parse_app_version(env!("CARGO_PKG_VERSION"))
}

fn parse_app_version(raw: &str) -> Result<Version, AppError> {
    let semver =
        semver::Version::parse(raw).map_err(|error| AppError::current_version(raw, error))?;
    Version::try_from(&semver).map_err(|error| AppError::current_version(raw, error))
}

/// Where the helper executable ships: next to the application binary.
#[must_use]
pub fn helper_beside(exe: &Path) -> PathBuf {
    exe.with_file_name(format!("{HELPER_NAME}{}", std::env::consts::EXE_SUFFIX))
}

/// Ledger replacing `target` with `download` and optionally restarting it.
///
/// # Errors
/// Returns [`AppError::Schedule`] when a path cannot be recorded.
pub fn plan_replacement(
    download: &Path,
    target: &Path,
    restart: bool,
) -> Result<ActionLedger, AppError> {
    let mut ledger = ActionLedger::new();
    if !ledger.add_move(download, target) {
        return Err(AppError::Schedule {
            action: "executable replacement",
        });
    }
    if restart && !ledger.add_start(target, None) {
        return Err(AppError::Schedule { action: "restart" });
    }
    if ledger.needs_elevation() {
        info!("{} is not writable, the helper will ask for elevation", target.display());
    }
    Ok(ledger)
}

#[cfg(unix)]
fn make_executable(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
}

#[cfg(not(unix))]
#[allow(clippy::unnecessary_wraps)]
fn make_executable(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

fn schedule_replacement(
    download: &Path,
    restart: bool,
    sub_directory: Option<&str>,
) -> Result<LaunchHandle, AppError> {
    let current_exe = std::env::current_exe().map_err(AppError::CurrentExe)?;
    let helper = helper_beside(&current_exe);
    if !helper.is_file() {
        return Err(AppError::HelperMissing(helper));
    }
    if let Err(error) = make_executable(download) {
        warn!("Could not mark {} executable: {error}", download.display());
    }

    let ledger = plan_replacement(download, &current_exe, restart)?;
    let mut options = LaunchOptions::default();
    if let Some(sub_directory) = sub_directory {
        options = options.with_sub_directory(sub_directory);
    }
    Ok(ledger.launch(&HelperExecutable::Path(helper), &options)?)
}

/// `check` subcommand.
///
/// # Errors
/// Returns [`AppError`] when the provider is misconfigured or unreachable.
pub async fn run_check(settings: &AppSettings) -> Result<(), AppError> {
    let current = current_version()?;
    let mut provider = Provider::from_settings(settings)?;
    let releases = provider.newer_releases(&current).await?;

    if releases.is_empty() {
        println!("swapkit {current} is up to date");
        return Ok(());
    }
    println!("swapkit {current}, {} newer release(s):", releases.len());
    for release in &releases {
        let marker = if release.prerelease { " (pre-release)" } else { "" };
        match &release.title {
            Some(title) => println!("  {}{marker}  {title}", release.tag),
            None => println!("  {}{marker}", release.tag),
        }
    }
    Ok(())
}

/// `update` subcommand: download the newest release and hand the swap over
/// to the helper. Returns without waiting for the helper.
///
/// # Errors
/// Returns [`AppError`] when any step before the helper starts fails.
pub async fn run_update(settings: &AppSettings, restart: bool) -> Result<(), AppError> {
    let current = current_version()?;
    let mut provider = Provider::from_settings(settings)?;
    let releases = provider.newer_releases(&current).await?;

    let Some(newest) = releases.first() else {
        println!("swapkit {current} is up to date");
        return Ok(());
    };
    info!("Updating {current} -> {}", newest.tag);

    let preferred = settings.asset_name.clone().or_else(|| asset_name(&newest.tag));
    debug!("Preferred asset name: {preferred:?}");
    let download = provider.download(newest, preferred.as_deref()).await?;

    match schedule_replacement(&download, restart, settings.helper_sub_directory.as_deref()) {
        Ok(handle) => {
            println!(
                "Update to {} downloaded; helper {} will finish once swapkit exits",
                newest.tag,
                handle.id()
            );
            Ok(())
        }
        Err(error) => {
            if let Err(remove_error) = std::fs::remove_file(&download) {
                warn!(
                    "Failed to remove downloaded update {}: {remove_error}",
                    download.display()
                );
            }
            Err(error)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use swapkit_core::{DownloadProgress, Version};
    use swapkit_ledger::Action;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::{
        AssetLink, ProgressLog, Provider, ReleaseSummary, asset_name_for, helper_beside,
        parse_app_version, plan_replacement, select_asset,
    };
    use crate::error::AppError;
    use crate::settings::{AppSettings, ProviderKind};

    fn link(name: &str) -> AssetLink {
        AssetLink {
            name: name.to_string(),
            url: format!("https://example.invalid/{name}"),
        }
    }

    fn github_settings(api_url: &str) -> AppSettings {
        AppSettings {
            github_api_url: api_url.to_string(),
            github_owner: "acme".to_string(),
            github_repo: "tool".to_string(),
            ..AppSettings::default()
        }
    }

    #[test]
    fn asset_name_strips_tag_prefix_and_names_platform() {
        assert_eq!(
            asset_name_for("v1.4.0", "linux", "x86_64").as_deref(),
            Some("swapkit-1.4.0-linux-x64")
        );
        assert_eq!(
            asset_name_for("2.0.0", "windows", "x86_64").as_deref(),
            Some("swapkit-2.0.0-windows-x64.exe")
        );
        assert_eq!(
            asset_name_for("v1.0.0", "macos", "aarch64").as_deref(),
            Some("swapkit-1.0.0-macos-arm64")
        );
        assert!(asset_name_for("1.0.0", "freebsd", "x86_64").is_none());
    }

    #[test]
    fn select_asset_prefers_named_match_then_first() {
        let assets = vec![link("notes.txt"), link("swapkit-1.0.0-linux-x64")];

        assert_eq!(
            select_asset(&assets, Some("SWAPKIT-1.0.0-LINUX-X64")).map(|a| a.name.as_str()),
            Some("swapkit-1.0.0-linux-x64")
        );
        assert_eq!(
            select_asset(&assets, Some("missing")).map(|a| a.name.as_str()),
            Some("notes.txt")
        );
        assert!(select_asset(&[], None).is_none());
    }

    #[test]
    fn progress_log_reports_each_tenth_once() {
        let mut log = ProgressLog::default();

        assert!(log.record(DownloadProgress::new(1000, 0)));
        assert!(!log.record(DownloadProgress::new(1000, 50)));
        assert!(log.record(DownloadProgress::new(1000, 120)));
        assert!(!log.record(DownloadProgress::new(1000, 199)));
        assert!(log.record(DownloadProgress::new(1000, 1000)));
    }

    #[test]
    fn progress_log_without_total_steps_per_mebibyte() {
        let mut log = ProgressLog::default();

        assert!(log.record(DownloadProgress::new(0, 10)));
        assert!(!log.record(DownloadProgress::new(0, 1024)));
        assert!(log.record(DownloadProgress::new(0, 1024 * 1024)));
    }

    #[test]
    fn package_version_converts_to_four_components() {
        assert_eq!(
            parse_app_version("1.2.3").expect("version should parse"),
            Version::parse("1.2.3.0").expect("version should parse")
        );
        assert!(matches!(
            parse_app_version("one"),
            Err(AppError::CurrentVersion { .. })
        ));
        super::current_version().expect("package version should be usable");
    }

    #[test]
    fn helper_is_looked_up_next_to_the_executable() {
        let helper = helper_beside(Path::new("/opt/swapkit/bin/swapkit"));
        let expected = format!("swapkit-executor{}", std::env::consts::EXE_SUFFIX);
        assert_eq!(helper, Path::new("/opt/swapkit/bin").join(expected));
    }

    #[test]
    fn replacement_plan_moves_then_restarts() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let download = temp.path().join("download.tmp");
        let target = temp.path().join("swapkit");
        std::fs::write(&download, b"new").expect("download should be written");

        let ledger = plan_replacement(&download, &target, true).expect("plan should succeed");

        assert_eq!(
            ledger.actions(),
            [
                Action::Move {
                    from: download,
                    to: target.clone()
                },
                Action::Start {
                    exe: target,
                    args: None
                },
            ]
        );
    }

    #[test]
    fn replacement_plan_without_restart_has_a_single_move() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let download = temp.path().join("download.tmp");
        std::fs::write(&download, b"new").expect("download should be written");

        let ledger = plan_replacement(&download, &temp.path().join("swapkit"), false)
            .expect("plan should succeed");

        assert_eq!(ledger.len(), 1);
        assert!(matches!(
            plan_replacement(&temp.path().join("absent"), &download, false),
            Err(AppError::Schedule { .. })
        ));
    }

    #[test]
    fn unconfigured_repository_is_rejected() {
        let result = Provider::from_settings(&AppSettings::default());
        assert!(matches!(result, Err(AppError::NotConfigured(_))));

        let gitlab = AppSettings {
            provider: ProviderKind::GitLab,
            ..AppSettings::default()
        };
        assert!(matches!(
            Provider::from_settings(&gitlab),
            Err(AppError::NotConfigured(_))
        ));
    }

    #[tokio::test]
    async fn github_releases_are_summarised_newest_first() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/tool/releases"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                { "tag_name": "v1.1.0", "name": "Minor", "assets": [] },
                { "tag_name": "v0.9.0", "name": "Old" },
                {
                    "tag_name": "v2.0.0",
                    "name": null,
                    "prerelease": true,
                    "assets": [{
                        "name": "swapkit-2.0.0-linux-x64",
                        "browser_download_url": "https://example.invalid/a"
                    }]
                }
            ])))
            .mount(&server)
            .await;

        let mut provider =
            Provider::from_settings(&github_settings(&server.uri())).expect("provider");
        let releases = provider
            .newer_releases(&Version::parse("1.0").expect("version"))
            .await
            .expect("listing should succeed");

        assert_eq!(
            releases,
            vec![
                ReleaseSummary {
                    tag: "v2.0.0".to_string(),
                    title: None,
                    prerelease: true,
                    assets: vec![AssetLink {
                        name: "swapkit-2.0.0-linux-x64".to_string(),
                        url: "https://example.invalid/a".to_string(),
                    }],
                },
                ReleaseSummary {
                    tag: "v1.1.0".to_string(),
                    title: Some("Minor".to_string()),
                    prerelease: false,
                    assets: Vec::new(),
                },
            ]
        );
    }

    #[tokio::test]
    async fn github_download_fetches_the_selected_asset() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/files/linux"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"linux build".to_vec()))
            .mount(&server)
            .await;

        let provider = Provider::from_settings(&github_settings(&server.uri())).expect("provider");
        let release = ReleaseSummary {
            tag: "v2.0.0".to_string(),
            title: None,
            prerelease: false,
            assets: vec![
                AssetLink {
                    name: "windows.exe".to_string(),
                    url: format!("{}/files/windows", server.uri()),
                },
                AssetLink {
                    name: "linux".to_string(),
                    url: format!("{}/files/linux", server.uri()),
                },
            ],
        };

        let downloaded = provider
            .download(&release, Some("linux"))
            .await
            .expect("download should succeed");

        assert_eq!(
            std::fs::read(&downloaded).expect("download should be readable"),
            b"linux build"
        );
        std::fs::remove_file(downloaded).expect("download should be removable");
    }

    #[tokio::test]
    async fn github_release_without_assets_cannot_be_downloaded() {
        let provider =
            Provider::from_settings(&github_settings("http://127.0.0.1:9")).expect("provider");
        let release = ReleaseSummary {
            tag: "v2.0.0".to_string(),
            title: None,
            prerelease: false,
            assets: Vec::new(),
        };

        let error = provider
            .download(&release, None)
            .await
            .expect_err("no asset should fail");
        assert!(matches!(error, AppError::NoAsset { tag } if tag == "v2.0.0"));
    }

    #[tokio::test]
    async fn gitlab_update_is_refused_without_fetching_the_archive() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/projects/42/repository/tags"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                { "name": "v9.0.0", "message": "Big one", "target": "abc" }
            ])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/projects/42/repository/archive.zip"))
            .respond_with(
                ResponseTemplate::new(200).set_body_bytes(b"PK\x03\x04zip-archive".to_vec()),
            )
            .expect(0)
            .mount(&server)
            .await;

        let settings = AppSettings {
            provider: ProviderKind::GitLab,
            gitlab_base_url: server.uri(),
            gitlab_project_id: "42".to_string(),
            ..AppSettings::default()
        };
        let mut provider = Provider::from_settings(&settings).expect("provider");
        let releases = provider
            .newer_releases(&Version::parse("1.0").expect("version"))
            .await
            .expect("listing should still work for GitLab");
        assert_eq!(releases.len(), 1);
        assert_eq!(releases[0].title.as_deref(), Some("Big one"));

        let error = provider
            .download(&releases[0], None)
            .await
            .expect_err("a source archive should never be installed");
        assert!(matches!(error, AppError::SourceArchiveOnly { tag } if tag == "v9.0.0"));
    }
}
