//! Resource resolution
//!
//! Every resource attribute is described by one [`AttributeRule`]: an ordered
//! list of sources, highest precedence first. The resolver walks each list
//! and keeps the first non-empty value. The tiers, from highest to lowest:
//!
//! 1. explicit [`TelemetryConfig`] fields
//! 2. `OTEL_RESOURCE_ATTRIBUTES`, then the documented environment aliases
//! 3. runtime detection (hostname, process, container, cloud heuristics)
//! 4. hard-coded defaults
//!
//! `TelemetryConfig::resource_attributes` is applied after the table and
//! overrides everything. Empty values are treated as absent at every tier and
//! never reach the final [`Resource`].

use crate::attribute::AttributeValue;
use crate::config::TelemetryConfig;
use crate::env::{EnvSource, ProcessEnv};
use crate::error::{TelemetryError, TelemetryResult};
use crate::resource::Resource;
use opentelemetry_semantic_conventions::resource as semconv;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Variable holding extra `key=value` resource attributes.
pub const RESOURCE_ATTRIBUTES_ENV: &str = "OTEL_RESOURCE_ATTRIBUTES";

/// Kubernetes service account namespace file, relative to the probe root.
const SERVICE_ACCOUNT_NAMESPACE: &str = "var/run/secrets/kubernetes.io/serviceaccount/namespace";

/// Process cgroup membership, relative to the probe root.
const PROC_SELF_CGROUP: &str = "proc/self/cgroup";

/// Length of the short container id used as a service instance id.
const SHORT_CONTAINER_ID_LEN: usize = 12;

/// Where a value for an attribute may come from.
#[derive(Debug, Clone, Copy)]
pub enum Source {
    /// A field of the caller's configuration
    Config(ConfigField),
    /// The first non-empty variable among the aliases
    Env(&'static [&'static str]),
    /// Part of a container image reference held in the first non-empty alias
    Image(&'static [&'static str], ImagePart),
    /// A runtime probe
    Detect(Detector),
    /// A built-in fallback
    Default(DefaultValue),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigField {
    ServiceName,
    ServiceVersion,
    ServiceNamespace,
    ServiceInstanceId,
    Environment,
    Team,
    Owner,
    BuildTime,
    GitCommit,
    GitBranch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImagePart {
    Name,
    Tag,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Detector {
    HostName,
    ProcessId,
    ExecutableName,
    OsType,
    HostArch,
    RuntimeVersion,
    RuntimeDescription,
    ContainerId,
    ShortContainerId,
    /// `HOSTNAME`, when running inside a detected container
    ContainerNameFromHostname,
    /// `HOSTNAME` containing a dash, when running inside Kubernetes
    PodNameFromHostname,
    ServiceAccountNamespace,
    CloudProvider,
    CloudPlatform,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultValue {
    Static(&'static str),
    /// `unknown_service:<executable>`
    UnknownService,
    /// A random UUID
    RandomId,
}

/// Ordered sources for one attribute key.
#[derive(Debug, Clone, Copy)]
pub struct AttributeRule {
    pub key: &'static str,
    pub sources: &'static [Source],
}

const POD_UID_ENV: &[&str] = &["K8S_POD_UID", "POD_UID"];

/// Precedence table for every resolved attribute.
pub static RESOURCE_RULES: &[AttributeRule] = &[
    AttributeRule {
        key: semconv::SERVICE_NAME,
        sources: &[
            Source::Config(ConfigField::ServiceName),
            Source::Env(&["SERVICE_NAME", "OTEL_SERVICE_NAME"]),
            Source::Default(DefaultValue::UnknownService),
        ],
    },
    AttributeRule {
        key: semconv::SERVICE_VERSION,
        sources: &[
            Source::Config(ConfigField::ServiceVersion),
            Source::Env(&["SERVICE_VERSION", "OTEL_SERVICE_VERSION"]),
            Source::Default(DefaultValue::Static("dev")),
        ],
    },
    AttributeRule {
        key: "service.namespace",
        sources: &[
            Source::Config(ConfigField::ServiceNamespace),
            Source::Env(&["SERVICE_NAMESPACE", "OTEL_SERVICE_NAMESPACE"]),
        ],
    },
    AttributeRule {
        key: "service.instance.id",
        sources: &[
            Source::Config(ConfigField::ServiceInstanceId),
            Source::Env(&["SERVICE_INSTANCE_ID", "OTEL_SERVICE_INSTANCE_ID"]),
            Source::Detect(Detector::ShortContainerId),
            Source::Env(POD_UID_ENV),
            Source::Detect(Detector::HostName),
            Source::Default(DefaultValue::RandomId),
        ],
    },
    AttributeRule {
        key: "deployment.environment.name",
        sources: &[
            Source::Config(ConfigField::Environment),
            Source::Env(&[
                "ENVIRONMENT",
                "DEPLOYMENT_ENVIRONMENT",
                "OTEL_DEPLOYMENT_ENVIRONMENT",
            ]),
            Source::Default(DefaultValue::Static("development")),
        ],
    },
    AttributeRule {
        key: "service.team",
        sources: &[
            Source::Config(ConfigField::Team),
            Source::Env(&["SERVICE_TEAM", "TEAM"]),
        ],
    },
    AttributeRule {
        key: "service.owner",
        sources: &[
            Source::Config(ConfigField::Owner),
            Source::Env(&["SERVICE_OWNER", "OWNER"]),
        ],
    },
    AttributeRule {
        key: "service.build.time",
        sources: &[
            Source::Config(ConfigField::BuildTime),
            Source::Env(&["BUILD_TIME", "SOURCE_DATE_EPOCH"]),
        ],
    },
    AttributeRule {
        key: "service.build.commit",
        sources: &[
            Source::Config(ConfigField::GitCommit),
            Source::Env(&["GIT_COMMIT", "BUILD_COMMIT", "VCS_REF"]),
        ],
    },
    AttributeRule {
        key: "service.build.branch",
        sources: &[
            Source::Config(ConfigField::GitBranch),
            Source::Env(&["GIT_BRANCH", "BUILD_BRANCH"]),
        ],
    },
    AttributeRule {
        key: semconv::TELEMETRY_SDK_NAME,
        sources: &[Source::Default(DefaultValue::Static("opentelemetry"))],
    },
    AttributeRule {
        key: semconv::TELEMETRY_SDK_LANGUAGE,
        sources: &[Source::Default(DefaultValue::Static("rust"))],
    },
    AttributeRule {
        key: semconv::TELEMETRY_SDK_VERSION,
        sources: &[Source::Default(DefaultValue::Static(env!("CARGO_PKG_VERSION")))],
    },
    AttributeRule {
        key: "process.runtime.name",
        sources: &[Source::Default(DefaultValue::Static("rustc"))],
    },
    AttributeRule {
        key: "process.runtime.version",
        sources: &[Source::Detect(Detector::RuntimeVersion)],
    },
    AttributeRule {
        key: "process.runtime.description",
        sources: &[Source::Detect(Detector::RuntimeDescription)],
    },
    AttributeRule {
        key: "process.pid",
        sources: &[Source::Detect(Detector::ProcessId)],
    },
    AttributeRule {
        key: "process.executable.name",
        sources: &[Source::Detect(Detector::ExecutableName)],
    },
    AttributeRule {
        key: "os.type",
        sources: &[Source::Detect(Detector::OsType)],
    },
    AttributeRule {
        key: "host.name",
        sources: &[Source::Detect(Detector::HostName)],
    },
    AttributeRule {
        key: "host.arch",
        sources: &[Source::Detect(Detector::HostArch)],
    },
    AttributeRule {
        key: "container.id",
        sources: &[
            Source::Env(&["CONTAINER_ID"]),
            Source::Detect(Detector::ContainerId),
        ],
    },
    AttributeRule {
        key: "container.name",
        sources: &[
            Source::Env(&["CONTAINER_NAME"]),
            Source::Detect(Detector::ContainerNameFromHostname),
        ],
    },
    AttributeRule {
        key: "container.image.name",
        sources: &[Source::Image(&["CONTAINER_IMAGE", "IMAGE_NAME"], ImagePart::Name)],
    },
    AttributeRule {
        key: "container.image.tag",
        sources: &[
            Source::Image(&["CONTAINER_IMAGE"], ImagePart::Tag),
            Source::Env(&["IMAGE_TAG"]),
        ],
    },
    AttributeRule {
        key: "k8s.pod.name",
        sources: &[
            Source::Env(&["K8S_POD_NAME", "POD_NAME"]),
            Source::Detect(Detector::PodNameFromHostname),
        ],
    },
    AttributeRule {
        key: "k8s.pod.uid",
        sources: &[Source::Env(POD_UID_ENV)],
    },
    AttributeRule {
        key: "k8s.namespace.name",
        sources: &[
            Source::Env(&["K8S_NAMESPACE", "POD_NAMESPACE"]),
            Source::Detect(Detector::ServiceAccountNamespace),
        ],
    },
    AttributeRule {
        key: "k8s.node.name",
        sources: &[Source::Env(&["K8S_NODE_NAME", "NODE_NAME"])],
    },
    AttributeRule {
        key: "k8s.deployment.name",
        sources: &[Source::Env(&["K8S_DEPLOYMENT_NAME", "DEPLOYMENT_NAME"])],
    },
    AttributeRule {
        key: "cloud.provider",
        sources: &[
            Source::Env(&["CLOUD_PROVIDER"]),
            Source::Detect(Detector::CloudProvider),
        ],
    },
    AttributeRule {
        key: "cloud.platform",
        sources: &[
            Source::Env(&["CLOUD_PLATFORM"]),
            Source::Detect(Detector::CloudPlatform),
        ],
    },
    AttributeRule {
        key: "cloud.region",
        sources: &[Source::Env(&[
            "CLOUD_REGION",
            "AWS_REGION",
            "AWS_DEFAULT_REGION",
            "GOOGLE_CLOUD_REGION",
        ])],
    },
    AttributeRule {
        key: "cloud.availability_zone",
        sources: &[Source::Env(&["CLOUD_AVAILABILITY_ZONE", "AWS_AVAILABILITY_ZONE"])],
    },
    AttributeRule {
        key: "cloud.account.id",
        sources: &[Source::Env(&[
            "CLOUD_ACCOUNT_ID",
            "AWS_ACCOUNT_ID",
            "GOOGLE_CLOUD_PROJECT",
            "AZURE_SUBSCRIPTION_ID",
        ])],
    },
];

#[derive(Debug, Clone)]
enum HostnameSource {
    System,
    Fixed(String),
    Failing(String),
}

/// Host and process facts read at resolution time.
///
/// Filesystem probes are relative to `root` (`/` by default) so tests can
/// point them at a temporary directory.
#[derive(Debug, Clone)]
pub struct RuntimeProbe {
    root: PathBuf,
    hostname: HostnameSource,
}

impl Default for RuntimeProbe {
    fn default() -> Self {
        Self {
            root: PathBuf::from("/"),
            hostname: HostnameSource::System,
        }
    }
}

impl RuntimeProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read well-known files below `root` instead of `/`.
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    /// Report `name` instead of asking the operating system.
    pub fn with_hostname(mut self, name: impl Into<String>) -> Self {
        self.hostname = HostnameSource::Fixed(name.into());
        self
    }

    /// Simulate a failing hostname system call.
    pub fn with_hostname_error(mut self, message: impl Into<String>) -> Self {
        self.hostname = HostnameSource::Failing(message.into());
        self
    }

    /// The machine hostname. An OS error is reported; a name that is not
    /// valid UTF-8 or is empty yields `None`.
    pub fn hostname(&self) -> TelemetryResult<Option<String>> {
        let name = match &self.hostname {
            HostnameSource::Fixed(name) => name.clone(),
            HostnameSource::Failing(message) => {
                return Err(TelemetryError::ResourceResolution(format!(
                    "hostname lookup failed: {message}"
                )));
            }
            HostnameSource::System => hostname::get()
                .map_err(|e| {
                    TelemetryError::ResourceResolution(format!("hostname lookup failed: {e}"))
                })?
                .into_string()
                .unwrap_or_default(),
        };
        Ok(non_empty(name))
    }

    /// Full container id from the process cgroup file.
    pub fn container_id(&self) -> Option<String> {
        let content = self.read(PROC_SELF_CGROUP)?;
        parse_cgroup_container_id(&content)
    }

    /// Namespace of the Kubernetes service account mounted into the pod.
    pub fn service_account_namespace(&self) -> Option<String> {
        self.read(SERVICE_ACCOUNT_NAMESPACE).and_then(non_empty)
    }

    fn read(&self, relative: &str) -> Option<String> {
        let path: PathBuf = self.root.join(relative);
        read_optional(&path)
    }
}

fn read_optional(path: &Path) -> Option<String> {
    match fs::read_to_string(path) {
        Ok(content) => Some(content),
        Err(e) => {
            tracing::trace!(path = %path.display(), error = %e, "optional probe file unavailable");
            None
        }
    }
}

/// Find a container id in `/proc/self/cgroup` content.
///
/// Recognises docker (`/docker/<id>`, `docker-<id>.scope`), containerd
/// (`cri-containerd-<id>.scope`) and cri-o (`crio-<id>.scope`) layouts.
pub fn parse_cgroup_container_id(content: &str) -> Option<String> {
    content
        .lines()
        .filter_map(|line| line.splitn(3, ':').nth(2))
        .flat_map(|path| path.split('/'))
        .find_map(|segment| {
            let segment = segment.strip_suffix(".scope").unwrap_or(segment);
            let id = ["docker-", "cri-containerd-", "crio-", "libpod-"]
                .iter()
                .find_map(|prefix| segment.strip_prefix(prefix))
                .unwrap_or(segment);
            is_container_id(id).then(|| id.to_string())
        })
}

fn is_container_id(candidate: &str) -> bool {
    candidate.len() == 64 && candidate.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Split an image reference into name and tag. A `:` before the last `/` is
/// a registry port, not a tag, and a `@digest` suffix is ignored.
pub fn split_image_ref(image: &str) -> (&str, Option<&str>) {
    let reference = image.split('@').next().unwrap_or(image);
    let name_start = reference.rfind('/').map_or(0, |i| i + 1);
    match reference[name_start..].rfind(':') {
        Some(i) => {
            let at = name_start + i;
            (&reference[..at], Some(&reference[at + 1..]))
        }
        None => (reference, None),
    }
}

/// Parse `OTEL_RESOURCE_ATTRIBUTES` (`k1=v1,k2=v2`). Values are
/// percent-decoded; malformed pairs are skipped.
pub fn parse_resource_attributes(raw: &str) -> BTreeMap<String, String> {
    let mut parsed = BTreeMap::new();
    for pair in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        match pair.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => {
                parsed.insert(key.trim().to_string(), percent_decode(value.trim()));
            }
            _ => tracing::warn!(pair, "skipping malformed {RESOURCE_ATTRIBUTES_ENV} entry"),
        }
    }
    parsed
}

fn percent_decode(value: &str) -> String {
    let bytes = value.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
            if let Some(byte) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                decoded.push(byte);
                i += 3;
                continue;
            }
        }
        decoded.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&decoded).into_owned()
}

fn non_empty(value: impl Into<String>) -> Option<String> {
    let value = value.into();
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn os_type() -> &'static str {
    match std::env::consts::OS {
        "macos" => "darwin",
        other => other,
    }
}

fn host_arch() -> &'static str {
    match std::env::consts::ARCH {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        "x86" => "x86",
        "powerpc64" => "ppc64",
        "s390x" => "s390x",
        other => other,
    }
}

fn rustc_version_string() -> Option<&'static str> {
    option_env!("BEACON_RUSTC_VERSION").filter(|v| !v.is_empty())
}

fn executable_name() -> Option<String> {
    std::env::current_exe()
        .ok()?
        .file_name()?
        .to_str()
        .map(str::to_string)
}

/// Builds the process [`Resource`] from configuration, environment and
/// runtime probes.
#[derive(Clone)]
pub struct ResourceResolver {
    env: Arc<dyn EnvSource>,
    probe: RuntimeProbe,
}

impl Default for ResourceResolver {
    fn default() -> Self {
        Self::new(Arc::new(ProcessEnv))
    }
}

impl ResourceResolver {
    pub fn new(env: Arc<dyn EnvSource>) -> Self {
        Self {
            env,
            probe: RuntimeProbe::default(),
        }
    }

    pub fn with_probe(mut self, probe: RuntimeProbe) -> Self {
        self.probe = probe;
        self
    }

    /// Resolve the resource for `config`.
    ///
    /// Missing optional data never fails resolution; only an unexpected
    /// error from a mandatory probe (the hostname lookup) does.
    pub fn resolve(&self, config: &TelemetryConfig) -> TelemetryResult<Resource> {
        let from_env = self
            .env
            .non_empty(RESOURCE_ATTRIBUTES_ENV)
            .map(|raw| parse_resource_attributes(&raw))
            .unwrap_or_default();

        let mut builder = Resource::builder();
        for rule in RESOURCE_RULES {
            if let Some(value) = self.evaluate(rule, config, &from_env)? {
                builder.set(rule.key, value);
            }
        }

        for (key, value) in &from_env {
            if !RESOURCE_RULES.iter().any(|rule| rule.key == key) {
                builder.set(key.clone(), value.as_str());
            }
        }

        for (key, value) in &config.resource_attributes {
            builder.set(key.clone(), value.as_str());
        }

        let resource = builder.build();
        tracing::debug!(
            service.name = resource.service_name(),
            attributes = resource.len(),
            "resolved telemetry resource"
        );
        Ok(resource)
    }

    fn evaluate(
        &self,
        rule: &AttributeRule,
        config: &TelemetryConfig,
        from_env: &BTreeMap<String, String>,
    ) -> TelemetryResult<Option<AttributeValue>> {
        let mut env_tier_checked = false;
        for source in rule.sources {
            if !matches!(source, Source::Config(_)) && !env_tier_checked {
                env_tier_checked = true;
                if let Some(value) = from_env.get(rule.key).cloned().and_then(non_empty) {
                    return Ok(Some(value.into()));
                }
            }

            let value = match *source {
                Source::Config(field) => config_field(config, field).map(AttributeValue::from),
                Source::Env(aliases) => self.env.first_of(aliases).map(AttributeValue::from),
                Source::Image(aliases, part) => self.env.first_of(aliases).and_then(|image| {
                    let (name, tag) = split_image_ref(&image);
                    match part {
                        ImagePart::Name => non_empty(name),
                        ImagePart::Tag => tag.and_then(non_empty),
                    }
                    .map(AttributeValue::from)
                }),
                Source::Detect(detector) => self.detect(detector)?,
                Source::Default(default) => Some(self.default_value(default)),
            };

            if let Some(value) = value.filter(|v| !v.is_empty()) {
                return Ok(Some(value));
            }
        }
        Ok(None)
    }

    fn detect(&self, detector: Detector) -> TelemetryResult<Option<AttributeValue>> {
        let value = match detector {
            Detector::HostName => self.probe.hostname()?.map(AttributeValue::from),
            Detector::ProcessId => Some(AttributeValue::from(std::process::id())),
            Detector::ExecutableName => executable_name().map(AttributeValue::from),
            Detector::OsType => Some(os_type().into()),
            Detector::HostArch => Some(host_arch().into()),
            Detector::RuntimeVersion => rustc_version_string()
                .and_then(|v| v.split_whitespace().nth(1))
                .map(AttributeValue::from),
            Detector::RuntimeDescription => rustc_version_string()
                .map(|v| format!("{v} {}/{}", os_type(), host_arch()).into()),
            Detector::ContainerId => self.probe.container_id().map(AttributeValue::from),
            Detector::ShortContainerId => self
                .env
                .non_empty("CONTAINER_ID")
                .or_else(|| self.probe.container_id())
                .map(|id| id.chars().take(SHORT_CONTAINER_ID_LEN).collect::<String>().into()),
            Detector::ContainerNameFromHostname => {
                let in_container = self.env.non_empty("CONTAINER_ID").is_some()
                    || self.probe.container_id().is_some();
                if in_container {
                    self.env.non_empty("HOSTNAME").map(AttributeValue::from)
                } else {
                    None
                }
            }
            Detector::PodNameFromHostname => {
                if self.env.any_set(&["KUBERNETES_SERVICE_HOST"]) {
                    self.env
                        .non_empty("HOSTNAME")
                        .filter(|name| name.contains('-'))
                        .map(AttributeValue::from)
                } else {
                    None
                }
            }
            Detector::ServiceAccountNamespace => self
                .probe
                .service_account_namespace()
                .map(AttributeValue::from),
            Detector::CloudProvider => self.cloud_provider().map(AttributeValue::from),
            Detector::CloudPlatform => self.cloud_platform().map(AttributeValue::from),
        };
        Ok(value)
    }

    fn cloud_provider(&self) -> Option<&'static str> {
        if self.env.any_set(&["AWS_REGION", "AWS_DEFAULT_REGION"]) {
            Some("aws")
        } else if self.env.any_set(&["GOOGLE_CLOUD_PROJECT", "GCP_PROJECT"]) {
            Some("gcp")
        } else if self.env.any_set(&["AZURE_SUBSCRIPTION_ID"]) {
            Some("azure")
        } else {
            None
        }
    }

    fn cloud_platform(&self) -> Option<&'static str> {
        if self.env.any_set(&["AWS_LAMBDA_FUNCTION_NAME"]) {
            Some("aws_lambda")
        } else if self.env.any_set(&["K_SERVICE"]) {
            Some("gcp_cloud_run")
        } else if self.env.any_set(&["WEBSITE_SITE_NAME"]) {
            Some("azure_app_service")
        } else {
            None
        }
    }

    fn default_value(&self, default: DefaultValue) -> AttributeValue {
        match default {
            DefaultValue::Static(value) => value.into(),
            DefaultValue::UnknownService => match executable_name() {
                Some(exe) => format!("unknown_service:{exe}").into(),
                None => "unknown_service".into(),
            },
            DefaultValue::RandomId => uuid::Uuid::new_v4().to_string().into(),
        }
    }
}

fn config_field(config: &TelemetryConfig, field: ConfigField) -> Option<String> {
    let value = match field {
        ConfigField::ServiceName => &config.service_name,
        ConfigField::ServiceVersion => &config.service_version,
        ConfigField::ServiceNamespace => &config.service_namespace,
        ConfigField::ServiceInstanceId => &config.service_instance_id,
        ConfigField::Environment => &config.environment,
        ConfigField::Team => &config.team,
        ConfigField::Owner => &config.owner,
        ConfigField::BuildTime => &config.build_time,
        ConfigField::GitCommit => &config.git_commit,
        ConfigField::GitBranch => &config.git_branch,
    };
    value.as_deref().and_then(non_empty)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const CONTAINER: &str = "3f4c6e0a9b8d7c6e5f4a3b2c1d0e9f8a7b6c5d4e3f2a1b0c9d8e7f6a5b4c3d2e";

    fn resolver(pairs: &[(&'static str, &'static str)]) -> ResourceResolver {
        let env: HashMap<&'static str, &'static str> = pairs.iter().copied().collect();
        let empty_root = std::env::temp_dir().join("beacon-telemetry-no-probe-root");
        ResourceResolver::new(Arc::new(env)).with_probe(
            RuntimeProbe::new()
                .with_root(empty_root)
                .with_hostname("build-host"),
        )
    }

    #[test]
    fn test_env_used_when_config_empty() {
        let config = TelemetryConfig {
            service_name: Some(String::new()),
            ..Default::default()
        };
        let resource = resolver(&[("SERVICE_NAME", "checkout")])
            .resolve(&config)
            .unwrap();
        assert_eq!(resource.get_str("service.name"), Some("checkout"));
    }

    #[test]
    fn test_config_beats_env() {
        let config = TelemetryConfig::new("checkout-explicit");
        let resource = resolver(&[("SERVICE_NAME", "checkout-env")])
            .resolve(&config)
            .unwrap();
        assert_eq!(resource.get_str("service.name"), Some("checkout-explicit"));
    }

    #[test]
    fn test_defaults() {
        let resource = resolver(&[]).resolve(&TelemetryConfig::default()).unwrap();
        assert_eq!(resource.get_str("service.version"), Some("dev"));
        assert_eq!(
            resource.get_str("deployment.environment.name"),
            Some("development")
        );
        assert!(resource.service_name().starts_with("unknown_service"));
        assert_eq!(resource.get_str("telemetry.sdk.language"), Some("rust"));
        assert_eq!(resource.get_str("host.name"), Some("build-host"));
        assert!(resource.get("process.pid").is_some());
    }

    #[test]
    fn test_env_beats_default() {
        let resource = resolver(&[("DEPLOYMENT_ENVIRONMENT", "staging")])
            .resolve(&TelemetryConfig::default())
            .unwrap();
        assert_eq!(
            resource.get_str("deployment.environment.name"),
            Some("staging")
        );
    }

    #[test]
    fn test_no_empty_attributes() {
        let config = TelemetryConfig {
            team: Some("  ".to_string()),
            ..TelemetryConfig::default().with_attribute("custom.empty", "")
        };
        let resource = resolver(&[("SERVICE_OWNER", ""), ("CONTAINER_NAME", " ")])
            .resolve(&config)
            .unwrap();
        assert!(resource.iter().all(|(_, v)| !v.is_empty()));
        assert!(resource.get("service.team").is_none());
        assert!(resource.get("service.owner").is_none());
        assert!(resource.get("custom.empty").is_none());
    }

    #[test]
    fn test_instance_id_from_container() {
        let resource = resolver(&[("CONTAINER_ID", CONTAINER)])
            .resolve(&TelemetryConfig::default())
            .unwrap();
        assert_eq!(resource.get_str("service.instance.id"), Some("3f4c6e0a9b8d"));
        assert_eq!(resource.get_str("container.id"), Some(CONTAINER));
    }

    #[test]
    fn test_instance_id_from_pod_uid_then_hostname() {
        let resource = resolver(&[("POD_UID", "8d1c-uid")])
            .resolve(&TelemetryConfig::default())
            .unwrap();
        assert_eq!(resource.get_str("service.instance.id"), Some("8d1c-uid"));

        let resource = resolver(&[]).resolve(&TelemetryConfig::default()).unwrap();
        assert_eq!(resource.get_str("service.instance.id"), Some("build-host"));
    }

    #[test]
    fn test_instance_id_random_when_nothing_else() {
        let resolver = ResourceResolver::new(Arc::new(HashMap::<String, String>::new()))
            .with_probe(RuntimeProbe::new().with_root("/nonexistent").with_hostname(""));
        let resource = resolver.resolve(&TelemetryConfig::default()).unwrap();
        let id = resource.get_str("service.instance.id").unwrap();
        assert!(uuid::Uuid::parse_str(id).is_ok());
        assert!(resource.get("host.name").is_none());
    }

    #[test]
    fn test_hostname_error_is_fatal() {
        let resolver = ResourceResolver::new(Arc::new(HashMap::<String, String>::new()))
            .with_probe(RuntimeProbe::new().with_hostname_error("EFAULT"));
        let err = resolver.resolve(&TelemetryConfig::default()).unwrap_err();
        assert!(matches!(err, TelemetryError::ResourceResolution(_)));
    }

    #[test]
    fn test_cloud_heuristics() {
        let resource = resolver(&[
            ("AWS_REGION", "eu-west-1"),
            ("AWS_LAMBDA_FUNCTION_NAME", "orders"),
        ])
        .resolve(&TelemetryConfig::default())
        .unwrap();
        assert_eq!(resource.get_str("cloud.provider"), Some("aws"));
        assert_eq!(resource.get_str("cloud.platform"), Some("aws_lambda"));
        assert_eq!(resource.get_str("cloud.region"), Some("eu-west-1"));

        let resource = resolver(&[("CLOUD_PROVIDER", "hetzner"), ("GCP_PROJECT", "p")])
            .resolve(&TelemetryConfig::default())
            .unwrap();
        assert_eq!(resource.get_str("cloud.provider"), Some("hetzner"));
    }

    #[test]
    fn test_pod_name_heuristic_requires_kubernetes() {
        let resource = resolver(&[("HOSTNAME", "api-7d9f8-x2x")])
            .resolve(&TelemetryConfig::default())
            .unwrap();
        assert!(resource.get("k8s.pod.name").is_none());

        let resource = resolver(&[
            ("HOSTNAME", "api-7d9f8-x2x"),
            ("KUBERNETES_SERVICE_HOST", "10.0.0.1"),
        ])
        .resolve(&TelemetryConfig::default())
        .unwrap();
        assert_eq!(resource.get_str("k8s.pod.name"), Some("api-7d9f8-x2x"));
    }

    #[test]
    fn test_resource_attributes_env() {
        let resource = resolver(&[
            (
                "OTEL_RESOURCE_ATTRIBUTES",
                "service.name=from-otel,team.slack=%23payments,broken",
            ),
            ("SERVICE_NAME", "from-alias"),
        ])
        .resolve(&TelemetryConfig::default())
        .unwrap();
        assert_eq!(resource.get_str("service.name"), Some("from-otel"));
        assert_eq!(resource.get_str("team.slack"), Some("#payments"));
        assert!(resource.get("broken").is_none());
    }

    #[test]
    fn test_config_attributes_override_everything() {
        let config = TelemetryConfig::new("checkout").with_attribute("service.name", "override");
        let resource = resolver(&[]).resolve(&config).unwrap();
        assert_eq!(resource.get_str("service.name"), Some("override"));
    }

    #[test]
    fn test_image_ref_split() {
        assert_eq!(split_image_ref("nginx:1.25"), ("nginx", Some("1.25")));
        assert_eq!(split_image_ref("nginx"), ("nginx", None));
        assert_eq!(
            split_image_ref("registry:5000/team/app"),
            ("registry:5000/team/app", None)
        );
        assert_eq!(
            split_image_ref("registry:5000/team/app:2.0@sha256:abcd"),
            ("registry:5000/team/app", Some("2.0"))
        );
    }

    #[test]
    fn test_image_attributes() {
        let resource = resolver(&[("CONTAINER_IMAGE", "ghcr.io/acme/api:1.4.2")])
            .resolve(&TelemetryConfig::default())
            .unwrap();
        assert_eq!(resource.get_str("container.image.name"), Some("ghcr.io/acme/api"));
        assert_eq!(resource.get_str("container.image.tag"), Some("1.4.2"));

        let resource = resolver(&[("IMAGE_NAME", "api"), ("IMAGE_TAG", "nightly")])
            .resolve(&TelemetryConfig::default())
            .unwrap();
        assert_eq!(resource.get_str("container.image.name"), Some("api"));
        assert_eq!(resource.get_str("container.image.tag"), Some("nightly"));
    }

    #[test]
    fn test_parse_cgroup_formats() {
        let docker = format!("12:memory:/docker/{CONTAINER}\n");
        assert_eq!(parse_cgroup_container_id(&docker).as_deref(), Some(CONTAINER));

        let systemd = format!("0::/system.slice/docker-{CONTAINER}.scope\n");
        assert_eq!(parse_cgroup_container_id(&systemd).as_deref(), Some(CONTAINER));

        let containerd =
            format!("0::/kubepods/besteffort/pod1234/cri-containerd-{CONTAINER}.scope");
        assert_eq!(parse_cgroup_container_id(&containerd).as_deref(), Some(CONTAINER));

        let crio = format!("0::/kubepods.slice/crio-{CONTAINER}.scope");
        assert_eq!(parse_cgroup_container_id(&crio).as_deref(), Some(CONTAINER));

        assert_eq!(parse_cgroup_container_id("0::/user.slice\n"), None);
    }

    #[test]
    fn test_probe_reads_files_below_root() {
        let dir = tempfile::tempdir().unwrap();
        let cgroup = dir.path().join("proc/self");
        std::fs::create_dir_all(&cgroup).unwrap();
        std::fs::write(cgroup.join("cgroup"), format!("1:name=systemd:/docker/{CONTAINER}\n"))
            .unwrap();
        let sa = dir.path().join("var/run/secrets/kubernetes.io/serviceaccount");
        std::fs::create_dir_all(&sa).unwrap();
        std::fs::write(sa.join("namespace"), "payments\n").unwrap();

        let resolver = ResourceResolver::new(Arc::new(HashMap::<String, String>::new()))
            .with_probe(RuntimeProbe::new().with_root(dir.path()).with_hostname("node"));
        let resource = resolver.resolve(&TelemetryConfig::default()).unwrap();

        assert_eq!(resource.get_str("container.id"), Some(CONTAINER));
        assert_eq!(resource.get_str("service.instance.id"), Some("3f4c6e0a9b8d"));
        assert_eq!(resource.get_str("k8s.namespace.name"), Some("payments"));
    }

    #[test]
    fn test_percent_decode() {
        assert_eq!(percent_decode("a%20b"), "a b");
        assert_eq!(percent_decode("100%"), "100%");
        assert_eq!(percent_decode("%zz"), "%zz");
    }
}
