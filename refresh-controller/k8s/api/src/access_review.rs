use k8s_openapi::api::authorization::v1::{
    ResourceAttributes, SelfSubjectAccessReview, SelfSubjectAccessReviewSpec,
};
use kube::{
    api::{Api, PostParams},
    Client,
};
use kubedesk_refresh_core::capability::Attributes;

/// The API server's answer to an access review.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AccessDecision {
    pub allowed: bool,
    pub reason: Option<String>,
    pub evaluation_error: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ReviewError {
    #[error("failed to create SelfSubjectAccessReview: {0}")]
    Request(#[from] kube::Error),

    #[error("SelfSubjectAccessReview response has no status")]
    MissingStatus,
}

/// Asks whether the current identity may perform an action.
#[async_trait::async_trait]
pub trait AccessReviewer: Send + Sync {
    async fn review(&self, attributes: &Attributes) -> Result<AccessDecision, ReviewError>;
}

#[async_trait::async_trait]
impl AccessReviewer for Client {
    async fn review(&self, attributes: &Attributes) -> Result<AccessDecision, ReviewError> {
        let review = SelfSubjectAccessReview {
            spec: SelfSubjectAccessReviewSpec {
                resource_attributes: Some(resource_attributes(attributes)),
                ..Default::default()
            },
            ..Default::default()
        };
        let api = Api::<SelfSubjectAccessReview>::all(self.clone());
        let response = api.create(&PostParams::default(), &review).await?;
        let status = response.status.ok_or(ReviewError::MissingStatus)?;
        tracing::trace!(
            verb = %attributes.verb,
            group = %attributes.group,
            resource = %attributes.resource,
            namespace = %attributes.namespace,
            allowed = status.allowed,
            "Reviewed access"
        );
        Ok(AccessDecision {
            allowed: status.allowed,
            reason: status.reason.filter(|r| !r.is_empty()),
            evaluation_error: status.evaluation_error.filter(|e| !e.is_empty()),
        })
    }
}

fn resource_attributes(attributes: &Attributes) -> ResourceAttributes {
    fn set(value: &str) -> Option<String> {
        if value.is_empty() {
            None
        } else {
            Some(value.to_string())
        }
    }

    ResourceAttributes {
        verb: set(&attributes.verb),
        group: set(&attributes.group),
        resource: set(&attributes.resource),
        namespace: set(&attributes.namespace),
        name: set(&attributes.name),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_attributes_are_unset() {
        let attrs = resource_attributes(&Attributes::new("list", "", "nodes"));
        assert_eq!(attrs.verb.as_deref(), Some("list"));
        assert_eq!(attrs.group, None);
        assert_eq!(attrs.resource.as_deref(), Some("nodes"));
        assert_eq!(attrs.namespace, None);
        assert_eq!(attrs.name, None);
    }

    #[test]
    fn namespaced_attributes() {
        let attrs = resource_attributes(
            &Attributes::new("delete", "apps", "deployments")
                .in_namespace("web")
                .named("frontend"),
        );
        assert_eq!(attrs.group.as_deref(), Some("apps"));
        assert_eq!(attrs.namespace.as_deref(), Some("web"));
        assert_eq!(attrs.name.as_deref(), Some("frontend"));
    }
}
