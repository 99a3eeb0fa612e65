//! Behaviour of the HTTP collaborators when the remote end cannot be reached.
//! Nothing here touches the public internet.

use std::time::Duration;

use skillgate_core::{
    standard_sources, ContentGenerator, Ecosystem, IndexError, PackageIndex, PublishRequest,
    PublishTarget, SkillCatalog, SkillgateError, SourceCollector,
};
use skillgate_remote::{
    AnthropicConfig, AnthropicGenerator, GithubCatalog, GithubConfig, GithubPublisher,
    RegistryIndex, RegistrySourceCollector,
};

const CLOSED: &str = "http://127.0.0.1:9";

fn timeout() -> Duration {
    Duration::from_secs(2)
}

fn closed_github() -> GithubConfig {
    GithubConfig::new("SharpSkill", "skills")
        .with_token("ghp_test")
        .with_bases(CLOSED, CLOSED)
}

#[tokio::test]
async fn test_index_lookup_against_closed_port_is_transient() {
    let index = RegistryIndex::with_bases(CLOSED, CLOSED, timeout()).unwrap();
    let err = index.lookup(Ecosystem::Pypi, "requests").await.unwrap_err();
    assert!(matches!(err, IndexError::Transport(_) | IndexError::Timeout(_)));
}

#[tokio::test]
async fn test_generator_failure_surfaces_as_collaborator_error() {
    let mut config = AnthropicConfig::new("sk-test");
    config.api_url = format!("{CLOSED}/v1/messages");
    let generator = AnthropicGenerator::new(config, timeout()).unwrap();
    let err = generator.generate("prompt").await.unwrap_err();
    assert!(matches!(err, SkillgateError::Collaborator(_)));
}

#[tokio::test]
async fn test_publish_failure_surfaces_as_collaborator_error() {
    let publisher = GithubPublisher::new(closed_github(), timeout()).unwrap();
    let request = PublishRequest {
        slug: "stripe".to_string(),
        content: "---\nname: stripe\n---\n".to_string(),
        label: None,
        message: "feat: add stripe skill".to_string(),
    };
    let err = publisher.publish(&request).await.unwrap_err();
    assert!(matches!(err, SkillgateError::Collaborator(_)));
}

#[tokio::test]
async fn test_catalog_rejects_unknown_source() {
    let catalog = GithubCatalog::new(closed_github(), standard_sources(), timeout()).unwrap();
    assert!(catalog.competitor_skills("nobody").await.is_err());
    assert!(catalog.competitor_skills("anthropic").await.is_err());
    assert!(catalog.own_skills().await.is_err());
}

#[tokio::test]
async fn test_collector_returns_empty_map_when_everything_is_down() {
    let collector = RegistrySourceCollector::new(closed_github(), timeout())
        .unwrap()
        .with_registries(CLOSED, CLOSED)
        .with_pacing(Duration::ZERO);
    let sources = collector.collect("stripe").await.unwrap();
    assert!(sources.is_empty());
}
