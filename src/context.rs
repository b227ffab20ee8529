use aws_config::environment::EnvironmentVariableCredentialsProvider;
use aws_config::{ConfigLoader, Region, SdkConfig};
use aws_sdk_ecs::config::BehaviorVersion;
use tracing::info;

pub const DEFAULT_REGION: &str = "us-west-2";
pub const DEFAULT_PROFILE: &str = "default";

pub const CREDENTIAL_ENV: &str = "ECSCREDENTIAL";

/// `--cred` value selecting `AWS_ACCESS_KEY_ID` / `AWS_SECRET_ACCESS_KEY`.
const ENV_SENTINEL: &str = "env";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialSource {
    Environment,
    Profile(String),
}

/// `--cred` wins over [`CREDENTIAL_ENV`], which wins over [`DEFAULT_PROFILE`].
/// Empty values count as unset.
pub fn resolve_credentials(flag: Option<&str>, env_profile: Option<&str>) -> CredentialSource {
    match flag.filter(|f| !f.is_empty()) {
        Some(ENV_SENTINEL) => CredentialSource::Environment,
        Some(profile) => CredentialSource::Profile(profile.to_string()),
        None => CredentialSource::Profile(
            env_profile
                .filter(|p| !p.is_empty())
                .unwrap_or(DEFAULT_PROFILE)
                .to_string(),
        ),
    }
}

#[derive(Debug, Clone)]
pub struct Context {
    pub config: SdkConfig,
    pub verbose: bool,
}

impl Context {
    pub async fn load(region: String, credentials: CredentialSource, verbose: bool) -> Self {
        let mut loader = ConfigLoader::default()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(region.clone()));

        loader = match &credentials {
            CredentialSource::Environment => {
                info!(%region, "running with credentials from environment variables");
                loader.credentials_provider(EnvironmentVariableCredentialsProvider::new())
            }
            CredentialSource::Profile(profile) => {
                info!(%region, %profile, "running with credential profile");
                loader.profile_name(profile)
            }
        };

        Self {
            config: loader.load().await,
            verbose,
        }
    }

    pub fn ecs(&self) -> aws_sdk_ecs::Client {
        aws_sdk_ecs::Client::new(&self.config)
    }

    pub fn elb(&self) -> aws_sdk_elasticloadbalancing::Client {
        aws_sdk_elasticloadbalancing::Client::new(&self.config)
    }
}
