//! Behaviour-driven tests for install version resolution.

mod support;

use pikesquares_bootstrap::config::{CONFIG_FILENAME, PikeSquaresConfig};
use pikesquares_bootstrap::error::BootstrapError;
use pikesquares_bootstrap::release_tags::{RELEASE_TAG_PREFIX, ReleaseTags};
use pikesquares_bootstrap::resolver::{ResolveInfo, parse_release_tag, resolve};
use pikesquares_bootstrap::version::ProductVersion;
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use support::StaticFetcher;
use tempfile::TempDir;

#[derive(Default)]
struct ResolutionWorld {
    tag: Option<String>,
    requested: Option<String>,
    project_dir: Option<TempDir>,
    fetcher: StaticFetcher,
    parsed: Option<Result<ProductVersion, BootstrapError>>,
    resolved: Option<Result<ResolveInfo, BootstrapError>>,
}

impl ResolutionWorld {
    fn version(&self) -> Option<String> {
        let parsed = self.parsed.as_ref().and_then(|r| r.as_ref().ok());
        let resolved = self
            .resolved
            .as_ref()
            .and_then(|r| r.as_ref().ok())
            .map(|info| &info.stable_version);
        parsed.or(resolved).map(ToString::to_string)
    }

    fn error(&self) -> Option<&BootstrapError> {
        let parsed = self.parsed.as_ref().and_then(|r| r.as_ref().err());
        let resolved = self.resolved.as_ref().and_then(|r| r.as_ref().err());
        parsed.or(resolved)
    }
}

#[fixture]
fn world() -> ResolutionWorld {
    ResolutionWorld::default()
}

#[given("the release tag \"{tag}\"")]
fn given_release_tag(world: &mut ResolutionWorld, tag: String) {
    world.tag = Some(tag);
}

#[given("the latest release is tagged \"{tag}\"")]
fn given_latest_release(world: &mut ResolutionWorld, tag: String) {
    world.fetcher = StaticFetcher::answering(serde_json::json!({ "tag_name": tag }));
}

#[given("the requested version \"{version}\"")]
fn given_requested_version(world: &mut ResolutionWorld, version: String) {
    world.requested = Some(version);
}

#[given("the project config pins \"{version}\"")]
fn given_project_config(world: &mut ResolutionWorld, version: String) {
    let temp = tempfile::tempdir().expect("create temp dir");
    std::fs::write(
        temp.path().join(CONFIG_FILENAME),
        format!("[GLOBAL]\npikesquares_version = \"{version}\"\n"),
    )
    .expect("write config");
    world.project_dir = Some(temp);
}

#[when("the tag is parsed")]
fn when_tag_parsed(world: &mut ResolutionWorld) {
    let tag = world.tag.as_deref().expect("tag set");
    world.parsed = Some(parse_release_tag(tag, RELEASE_TAG_PREFIX));
}

#[when("the version is resolved")]
fn when_version_resolved(world: &mut ResolutionWorld) {
    let project = world.project_dir.as_ref().map(|dir| {
        PikeSquaresConfig::discover(None, dir.path())
            .expect("read config")
            .expect("config present")
    });
    let tags = ReleaseTags::bundled().expect("bundled tags");
    let result = resolve(
        world.requested.as_deref(),
        project.as_ref().and_then(PikeSquaresConfig::pikesquares_version),
        &world.fetcher,
        &tags,
    )
    .map(|(info, _source)| info);
    world.resolved = Some(result);
}

#[then("the resolved version is \"{version}\"")]
fn then_resolved_version(world: &mut ResolutionWorld, version: String) {
    assert_eq!(world.version(), Some(version));
}

#[then("resolution fails mentioning \"{raw}\"")]
fn then_resolution_fails(world: &mut ResolutionWorld, raw: String) {
    let err = world.error().expect("resolution should fail");
    assert!(matches!(err, BootstrapError::Resolution { .. }));
    assert!(err.to_string().contains(&raw), "{err} should mention {raw}");
}

#[then("the latest release was requested {count:usize} times")]
fn then_request_count(world: &mut ResolutionWorld, count: usize) {
    assert_eq!(world.fetcher.requests(), count);
}

#[then("no commit is known")]
fn then_no_commit(world: &mut ResolutionWorld) {
    let info = world
        .resolved
        .as_ref()
        .and_then(|r| r.as_ref().ok())
        .expect("resolved");
    assert!(info.sha_version.is_none());
}

#[then("the version is a development build")]
fn then_development(world: &mut ResolutionWorld) {
    let info = world
        .resolved
        .as_ref()
        .and_then(|r| r.as_ref().ok())
        .expect("resolved");
    assert!(info.is_development());
}

#[scenario(
    path = "tests/features/resolution.feature",
    name = "A prefixed release tag yields its version"
)]
fn scenario_prefixed_tag(world: ResolutionWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/resolution.feature",
    name = "A tag without the release prefix is rejected"
)]
fn scenario_unprefixed_tag(world: ResolutionWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/resolution.feature",
    name = "The latest release is used when no version is given"
)]
fn scenario_latest_release(world: ResolutionWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/resolution.feature",
    name = "A malformed latest release tag is fatal"
)]
fn scenario_malformed_latest(world: ResolutionWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/resolution.feature",
    name = "A development version never reaches the network"
)]
fn scenario_development_offline(world: ResolutionWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/resolution.feature",
    name = "The project config file overrides the latest release"
)]
fn scenario_config_override(world: ResolutionWorld) {
    let _ = world;
}
