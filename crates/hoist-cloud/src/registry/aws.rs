use crate::command::CommandSpec;

use super::ECR_PATTERN;

/// Expire untagged images after a day and keep at most 50 images.
pub const LIFECYCLE_POLICY: &str = r#"{"rules":[{"rulePriority":1,"description":"Expire untagged images","selection":{"tagStatus":"untagged","countType":"sinceImagePushed","countUnit":"days","countNumber":1},"action":{"type":"expire"}},{"rulePriority":2,"description":"Keep the last 50 images","selection":{"tagStatus":"any","countType":"imageCountMoreThan","countNumber":50},"action":{"type":"expire"}}]}"#;

/// An ECR registry host, `<account>.dkr.ecr.<region>.amazonaws.com`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EcrHost {
    pub host: String,
    pub account_id: String,
    pub region: String,
}

impl EcrHost {
    pub fn parse(host: &str) -> Option<Self> {
        let caps = ECR_PATTERN.captures(host)?;
        Some(Self {
            host: host.to_owned(),
            account_id: caps.get(1)?.as_str().to_owned(),
            region: caps.get(3)?.as_str().to_owned(),
        })
    }
}

pub(super) fn login_password(host: &EcrHost) -> CommandSpec {
    CommandSpec::new(
        "aws",
        ["ecr", "get-login-password", "--region", host.region.as_str()],
    )
}

pub(super) fn create_repository(host: &EcrHost, repository: &str) -> CommandSpec {
    CommandSpec::new(
        "aws",
        [
            "ecr",
            "create-repository",
            "--repository-name",
            repository,
            "--registry-id",
            host.account_id.as_str(),
            "--region",
            host.region.as_str(),
        ],
    )
}

pub(super) fn put_lifecycle_policy(host: &EcrHost, repository: &str) -> CommandSpec {
    CommandSpec::new(
        "aws",
        [
            "ecr",
            "put-lifecycle-policy",
            "--repository-name",
            repository,
            "--registry-id",
            host.account_id.as_str(),
            "--region",
            host.region.as_str(),
            "--lifecycle-policy-text",
            LIFECYCLE_POLICY,
        ],
    )
}
