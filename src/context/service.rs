use regex::Regex;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use crate::config::RepositoryConfig;
use crate::context::{RepositoryManager, ServiceProvider};
use crate::error::{ApiError, ApiResult};
use crate::model::{generate_id, Concept, Id, Resource, UserContext};
use crate::request::expand::{
    BundleAncestorsExpander, ConceptDescendantsExpander, ResourceDescendantsExpander,
    ResourceExpander, VersionsExpander,
};
use crate::request::uri_resolver::{DefaultResourceURIPathResolver, ResourceURIPathResolver};
use crate::store::LockManager;
use crate::validation::{DefaultValidationService, ValidationService};

/// Generates ids for create requests that do not carry one.
pub trait IdGenerator: Send + Sync {
    fn generate(&self) -> Id;
}

#[derive(Debug, Default)]
pub struct UuidIdGenerator;

impl IdGenerator for UuidIdGenerator {
    fn generate(&self) -> Id {
        generate_id()
    }
}

/// Checks the scheme of resource URLs.
pub trait UrlValidator: Send + Sync {
    fn validate(&self, url: &str) -> ApiResult<()>;
}

static URL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(https?://[^\s/$.?#][^\s]*|urn:[a-zA-Z0-9][a-zA-Z0-9-]{0,31}:\S+)$")
        .expect("valid url pattern")
});

/// Accepts `http(s)://` URLs and URNs.
#[derive(Debug, Default)]
pub struct DefaultUrlValidator;

impl UrlValidator for DefaultUrlValidator {
    fn validate(&self, url: &str) -> ApiResult<()> {
        if URL_PATTERN.is_match(url) {
            Ok(())
        } else {
            Err(ApiError::bad_request(format!(
                "Resource URL '{}' does not match the allowed URL schemas (http, https, urn).",
                url
            )))
        }
    }
}

/// Capabilities shared by every request executed by this server.
pub struct Services {
    config: RepositoryConfig,
    repositories: RepositoryManager,
    validation: Arc<dyn ValidationService>,
    id_generator: Arc<dyn IdGenerator>,
    uri_resolver: Arc<dyn ResourceURIPathResolver>,
    url_validator: Arc<dyn UrlValidator>,
    locks: Arc<LockManager>,
    resource_expanders: Vec<Arc<dyn ResourceExpander<Resource>>>,
    concept_expanders: Vec<Arc<dyn ResourceExpander<Concept>>>,
}

impl Services {
    pub fn builder(config: RepositoryConfig) -> ServicesBuilder {
        ServicesBuilder {
            config,
            repositories: None,
            validation: None,
            id_generator: None,
            uri_resolver: None,
            url_validator: None,
        }
    }

    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    pub fn repositories(&self) -> &RepositoryManager {
        &self.repositories
    }

    pub fn validation(&self) -> &dyn ValidationService {
        self.validation.as_ref()
    }

    pub fn id_generator(&self) -> &dyn IdGenerator {
        self.id_generator.as_ref()
    }

    pub fn uri_resolver(&self) -> &dyn ResourceURIPathResolver {
        self.uri_resolver.as_ref()
    }

    pub fn url_validator(&self) -> &dyn UrlValidator {
        self.url_validator.as_ref()
    }

    pub fn locks(&self) -> &Arc<LockManager> {
        &self.locks
    }

    pub fn resource_expanders(&self) -> &[Arc<dyn ResourceExpander<Resource>>] {
        &self.resource_expanders
    }

    pub fn concept_expanders(&self) -> &[Arc<dyn ResourceExpander<Concept>>] {
        &self.concept_expanders
    }
}

pub struct ServicesBuilder {
    config: RepositoryConfig,
    repositories: Option<RepositoryManager>,
    validation: Option<Arc<dyn ValidationService>>,
    id_generator: Option<Arc<dyn IdGenerator>>,
    uri_resolver: Option<Arc<dyn ResourceURIPathResolver>>,
    url_validator: Option<Arc<dyn UrlValidator>>,
}

impl ServicesBuilder {
    pub fn repositories(mut self, repositories: RepositoryManager) -> Self {
        self.repositories = Some(repositories);
        self
    }

    pub fn validation(mut self, validation: Arc<dyn ValidationService>) -> Self {
        self.validation = Some(validation);
        self
    }

    pub fn id_generator(mut self, id_generator: Arc<dyn IdGenerator>) -> Self {
        self.id_generator = Some(id_generator);
        self
    }

    pub fn uri_resolver(mut self, uri_resolver: Arc<dyn ResourceURIPathResolver>) -> Self {
        self.uri_resolver = Some(uri_resolver);
        self
    }

    pub fn url_validator(mut self, url_validator: Arc<dyn UrlValidator>) -> Self {
        self.url_validator = Some(url_validator);
        self
    }

    pub fn build(self) -> Arc<Services> {
        let repositories = self
            .repositories
            .unwrap_or_else(|| RepositoryManager::in_memory(&self.config.tooling_ids));
        let locks = Arc::new(LockManager::new(Duration::from_millis(self.config.lock_timeout_ms)));

        Arc::new(Services {
            repositories,
            validation: self
                .validation
                .unwrap_or_else(|| Arc::new(DefaultValidationService)),
            id_generator: self.id_generator.unwrap_or_else(|| Arc::new(UuidIdGenerator)),
            uri_resolver: self
                .uri_resolver
                .unwrap_or_else(|| Arc::new(DefaultResourceURIPathResolver)),
            url_validator: self
                .url_validator
                .unwrap_or_else(|| Arc::new(DefaultUrlValidator)),
            locks,
            resource_expanders: vec![
                Arc::new(BundleAncestorsExpander),
                Arc::new(VersionsExpander),
                Arc::new(ResourceDescendantsExpander),
            ],
            concept_expanders: vec![Arc::new(ConceptDescendantsExpander)],
            config: self.config,
        })
    }
}

/// Root execution context: the shared services and the calling user.
#[derive(Clone)]
pub struct ServiceContext {
    pub(crate) services: Arc<Services>,
    pub(crate) user: UserContext,
}

impl ServiceContext {
    pub fn new(services: Arc<Services>, user: UserContext) -> Self {
        Self { services, user }
    }

    pub fn with_user(&self, user: UserContext) -> Self {
        Self {
            services: Arc::clone(&self.services),
            user,
        }
    }

    pub fn services_arc(&self) -> &Arc<Services> {
        &self.services
    }
}

impl ServiceProvider for ServiceContext {
    fn service_context(&self) -> &ServiceContext {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_schemas() {
        let validator = DefaultUrlValidator;
        assert!(validator.validate("http://snomed.info/sct").is_ok());
        assert!(validator.validate("https://loinc.org").is_ok());
        assert!(validator.validate("urn:oid:2.16.840.1.113883.6.96").is_ok());
        assert!(validator.validate("ftp://example.com").is_err());
        assert!(validator.validate("not a url").is_err());
    }

    #[test]
    fn uuid_ids_are_unique() {
        let generator = UuidIdGenerator;
        assert_ne!(generator.generate(), generator.generate());
    }
}
