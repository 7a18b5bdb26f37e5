// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Builds the flagd sidecar container and merges it into a pod.

use crate::config::Config;
use crate::constants::sidecar::{
    CONTAINER_NAME, LIVENESS_PATH, PROBE_INITIAL_DELAY_SECS, PROBE_PERIOD_SECS, READINESS_PATH,
    RUN_AS_ID,
};
use crate::error::{FlagdError, Result};
use crate::proxy::ProxyManager;
use crate::sidecar::sources::{PodContext, PodEffects, SourceConfig, SourceResolver};
use crate::types::FeatureFlagSourceSpec;
use k8s_openapi::api::core::v1::{
    Capabilities, Container, ContainerPort, EnvVar, HTTPGetAction, PodSpec, Probe,
    SeccompProfile, SecurityContext,
};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::api::ObjectMeta;
use kube::Client;
use tracing::{debug, instrument};

/// Injects the flagd sidecar described by a FeatureFlagSourceSpec.
#[derive(Clone)]
pub struct FlagdInjector {
    config: Config,
    resolver: SourceResolver,
}

impl FlagdInjector {
    pub fn new(client: Client, config: Config, proxy: ProxyManager) -> Self {
        Self {
            config,
            resolver: SourceResolver::new(client, proxy),
        }
    }

    /// Resolve every source and merge the resulting sidecar into the pod.
    ///
    /// Nothing is written to `meta` or `pod_spec` unless all sources resolve.
    /// Re-injecting replaces the existing `flagd` container.
    #[instrument(skip_all, fields(pod = ?meta.name, namespace = ?meta.namespace))]
    pub async fn inject(
        &self,
        meta: &mut ObjectMeta,
        pod_spec: &mut PodSpec,
        spec: &FeatureFlagSourceSpec,
    ) -> Result<()> {
        let pod = PodContext {
            namespace: meta
                .namespace
                .clone()
                .ok_or(FlagdError::MissingObjectKey("metadata.namespace"))?,
            service_account: pod_spec.service_account_name.clone(),
            owner: meta.owner_references.as_ref().and_then(|o| o.first().cloned()),
        };

        let mut configs = Vec::with_capacity(spec.sources.len());
        let mut effects = PodEffects::default();
        for source in &spec.sources {
            let resolved = self
                .resolver
                .resolve(source, spec.default_sync_provider.as_deref(), &pod)
                .await?;
            configs.push(resolved.config);
            effects.extend(resolved.effects);
        }

        let mut sidecar = self.base_container(spec);
        sidecar.args = Some(sidecar_args(&configs, spec)?);
        if !effects.mounts.is_empty() {
            sidecar.volume_mounts = Some(effects.mounts);
        }

        debug!("Injecting {} with {} sources", CONTAINER_NAME, configs.len());

        if !effects.annotations.is_empty() {
            meta.annotations
                .get_or_insert_with(Default::default)
                .extend(effects.annotations);
        }

        if !effects.volumes.is_empty() {
            let volumes = pod_spec.volumes.get_or_insert_with(Vec::new);
            for volume in effects.volumes {
                match volumes.iter_mut().find(|v| v.name == volume.name) {
                    Some(existing) => *existing = volume,
                    None => volumes.push(volume),
                }
            }
        }

        let env = sidecar.env.clone().unwrap_or_default();
        for container in pod_spec
            .containers
            .iter_mut()
            .filter(|c| c.name != CONTAINER_NAME)
        {
            merge_env(container, &env);
        }

        match pod_spec
            .containers
            .iter_mut()
            .find(|c| c.name == CONTAINER_NAME)
        {
            Some(existing) => *existing = sidecar,
            None => pod_spec.containers.push(sidecar),
        }

        Ok(())
    }

    fn base_container(&self, spec: &FeatureFlagSourceSpec) -> Container {
        let sidecar = &self.config.sidecar;
        let management_port = spec.management_port.unwrap_or(sidecar.management_port);
        let probes_enabled = spec.probes_enabled.unwrap_or(sidecar.probes_enabled);
        let env = spec.to_env_vars();

        let resources = match &spec.resources {
            Some(r) => Some(r.to_requirements()),
            None => self
                .config
                .default_flag_source_spec()
                .resources
                .map(|r| r.to_requirements()),
        };

        Container {
            name: CONTAINER_NAME.to_string(),
            image: Some(format!("{}:{}", sidecar.image, sidecar.tag)),
            ports: Some(vec![ContainerPort {
                name: Some("management".to_string()),
                container_port: management_port,
                ..Default::default()
            }]),
            env: (!env.is_empty()).then_some(env),
            resources,
            liveness_probe: probes_enabled.then(|| http_probe(LIVENESS_PATH, management_port)),
            readiness_probe: probes_enabled.then(|| http_probe(READINESS_PATH, management_port)),
            security_context: Some(security_context()),
            ..Default::default()
        }
    }
}

/// flagd command line: `start`, the JSON sources, then optional flags
pub fn sidecar_args(configs: &[SourceConfig], spec: &FeatureFlagSourceSpec) -> Result<Vec<String>> {
    let mut args = vec!["start".to_string()];

    if !configs.is_empty() {
        args.push("--sources".to_string());
        args.push(serde_json::to_string(configs)?);
    }

    for arg in &spec.sync_provider_args {
        args.push("--sync-provider-args".to_string());
        args.push(arg.clone());
    }

    if spec.debug_logging.unwrap_or(false) {
        args.push("--debug".to_string());
    }

    if let Some(uri) = spec.otel_collector_uri.as_ref().filter(|u| !u.is_empty()) {
        args.extend([
            "--metrics-exporter".to_string(),
            "otel".to_string(),
            "--otel-collector-uri".to_string(),
            uri.clone(),
        ]);
    }

    Ok(args)
}

/// Set each variable on the container, replacing any with the same name
fn merge_env(container: &mut Container, env: &[EnvVar]) {
    let target = container.env.get_or_insert_with(Vec::new);
    for var in env {
        match target.iter_mut().find(|e| e.name == var.name) {
            Some(existing) => *existing = var.clone(),
            None => target.push(var.clone()),
        }
    }
}

fn http_probe(path: &str, port: i32) -> Probe {
    Probe {
        http_get: Some(HTTPGetAction {
            path: Some(path.to_string()),
            port: IntOrString::Int(port),
            scheme: Some("HTTP".to_string()),
            ..Default::default()
        }),
        initial_delay_seconds: Some(PROBE_INITIAL_DELAY_SECS),
        period_seconds: Some(PROBE_PERIOD_SECS),
        ..Default::default()
    }
}

fn security_context() -> SecurityContext {
    SecurityContext {
        allow_privilege_escalation: Some(false),
        privileged: Some(false),
        run_as_non_root: Some(true),
        run_as_user: Some(RUN_AS_ID),
        run_as_group: Some(RUN_AS_ID),
        read_only_root_filesystem: Some(true),
        capabilities: Some(Capabilities {
            drop: Some(vec!["ALL".to_string()]),
            ..Default::default()
        }),
        seccomp_profile: Some(SeccompProfile {
            type_: "RuntimeDefault".to_string(),
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::annotations::ALLOW_KUBERNETES_SYNC;
    use crate::test_utils::{cluster_role_binding_json, service_account_json, to_json, MockService};
    use crate::types::feature_flag::{FeatureFlagSpec, FlagSpec};
    use crate::types::{FeatureFlag, Source};
    use k8s_openapi::api::rbac::v1::ClusterRoleBinding;
    use std::collections::BTreeMap;

    const FLAG_PATH: &str = "/apis/core.openfeature.dev/v1beta1/namespaces/other-ns/featureflags/flag1";
    const CRB_PATH: &str =
        "/apis/rbac.authorization.k8s.io/v1/clusterrolebindings/open-feature-operator-flagd-kubernetes-sync";

    fn injector(mock: &MockService) -> FlagdInjector {
        let client = mock.clone().into_client();
        FlagdInjector::new(
            client.clone(),
            Config::default(),
            ProxyManager::new(client, Config::default()),
        )
    }

    fn pod() -> (ObjectMeta, PodSpec) {
        (
            ObjectMeta {
                name: Some("web".to_string()),
                namespace: Some("ns1".to_string()),
                ..Default::default()
            },
            PodSpec {
                containers: vec![Container {
                    name: "app".to_string(),
                    image: Some("app:1.0".to_string()),
                    env: Some(vec![EnvVar {
                        name: "APP_MODE".to_string(),
                        value: Some("prod".to_string()),
                        ..Default::default()
                    }]),
                    ..Default::default()
                }],
                ..Default::default()
            },
        )
    }

    fn http_spec() -> FeatureFlagSourceSpec {
        let mut spec = Config::default().default_flag_source_spec();
        spec.sources.push(Source {
            source: "https://flags.example/api".to_string(),
            provider: "http".to_string(),
            ..Default::default()
        });
        spec
    }

    fn flagd(spec: &PodSpec) -> &Container {
        spec.containers.iter().find(|c| c.name == "flagd").unwrap()
    }

    fn sources_arg(container: &Container) -> Vec<SourceConfig> {
        let args = container.args.as_ref().unwrap();
        let idx = args.iter().position(|a| a == "--sources").unwrap();
        serde_json::from_str(&args[idx + 1]).unwrap()
    }

    #[tokio::test]
    async fn test_inject_is_idempotent() {
        let mock = MockService::new();
        let (mut meta, mut spec) = pod();
        let fs = http_spec();

        injector(&mock).inject(&mut meta, &mut spec, &fs).await.unwrap();
        let first = spec.clone();
        injector(&mock).inject(&mut meta, &mut spec, &fs).await.unwrap();

        assert_eq!(spec.containers.iter().filter(|c| c.name == "flagd").count(), 1);
        assert_eq!(spec, first);
    }

    #[tokio::test]
    async fn test_inject_propagates_env_to_other_containers() {
        let (mut meta, mut spec) = pod();

        injector(&MockService::new())
            .inject(&mut meta, &mut spec, &http_spec())
            .await
            .unwrap();

        let app = spec.containers.iter().find(|c| c.name == "app").unwrap();
        let names: Vec<_> = app.env.as_ref().unwrap().iter().map(|e| e.name.as_str()).collect();
        assert!(names.contains(&"APP_MODE"));
        assert!(names.contains(&"FLAGD_PORT"));
        assert!(names.contains(&"FLAGD_MANAGEMENT_PORT"));
        assert_eq!(flagd(&spec).env, Some(http_spec().to_env_vars()));
    }

    #[tokio::test]
    async fn test_inject_applies_fixed_security_policy() {
        let (mut meta, mut spec) = pod();

        injector(&MockService::new())
            .inject(&mut meta, &mut spec, &http_spec())
            .await
            .unwrap();

        let sc = flagd(&spec).security_context.clone().unwrap();
        assert_eq!(sc.run_as_user, Some(65532));
        assert_eq!(sc.run_as_group, Some(65532));
        assert_eq!(sc.run_as_non_root, Some(true));
        assert_eq!(sc.read_only_root_filesystem, Some(true));
        assert_eq!(sc.allow_privilege_escalation, Some(false));
        assert_eq!(sc.seccomp_profile.unwrap().type_, "RuntimeDefault");
        assert_eq!(sc.capabilities.unwrap().drop, Some(vec!["ALL".to_string()]));
    }

    #[tokio::test]
    async fn test_inject_probes_follow_spec() {
        let (mut meta, mut spec) = pod();
        let mut fs = http_spec();

        injector(&MockService::new()).inject(&mut meta, &mut spec, &fs).await.unwrap();
        let probe = flagd(&spec).liveness_probe.clone().unwrap();
        assert_eq!(probe.http_get.unwrap().port, IntOrString::Int(8014));

        fs.probes_enabled = Some(false);
        injector(&MockService::new()).inject(&mut meta, &mut spec, &fs).await.unwrap();
        assert!(flagd(&spec).liveness_probe.is_none());
        assert!(flagd(&spec).readiness_probe.is_none());
    }

    #[tokio::test]
    async fn test_inject_without_sources_omits_sources_arg() {
        let (mut meta, mut spec) = pod();
        let fs = Config::default().default_flag_source_spec();

        injector(&MockService::new()).inject(&mut meta, &mut spec, &fs).await.unwrap();

        assert_eq!(flagd(&spec).args, Some(vec!["start".to_string()]));
    }

    #[tokio::test]
    async fn test_inject_fails_fast_without_touching_pod() {
        let (mut meta, mut spec) = pod();
        let mut fs = http_spec();
        fs.sources.push(Source {
            source: "x".to_string(),
            provider: "smoke-signals".to_string(),
            ..Default::default()
        });
        let before = (meta.clone(), spec.clone());

        let err = injector(&MockService::new())
            .inject(&mut meta, &mut spec, &fs)
            .await
            .unwrap_err();

        assert!(matches!(err, FlagdError::UnrecognizedProvider(_)));
        assert_eq!((meta, spec), before);
    }

    #[tokio::test]
    async fn test_inject_kubernetes_source_end_to_end() {
        let mut ff = FeatureFlag::new(
            "flag1",
            FeatureFlagSpec {
                flag_spec: FlagSpec::default(),
            },
        );
        ff.metadata.namespace = Some("other-ns".to_string());
        let mock = MockService::new()
            .on_get(FLAG_PATH, 200, &to_json(&ff))
            .on_get(
                "/api/v1/namespaces/ns1/serviceaccounts/default",
                200,
                &service_account_json("ns1", "default"),
            )
            .on_get(CRB_PATH, 200, &cluster_role_binding_json(&[]))
            .on_put(CRB_PATH, 200, &cluster_role_binding_json(&[("ns1", "default")]));
        let (mut meta, mut spec) = pod();
        let mut fs = Config::default().default_flag_source_spec();
        fs.sources.push(Source {
            source: "other-ns/flag1".to_string(),
            provider: "kubernetes".to_string(),
            ..Default::default()
        });

        injector(&mock).inject(&mut meta, &mut spec, &fs).await.unwrap();

        assert_eq!(
            meta.annotations.unwrap().get(ALLOW_KUBERNETES_SYNC),
            Some(&"true".to_string())
        );

        let puts = mock.requests_with("PUT", CRB_PATH);
        let crb: ClusterRoleBinding = serde_json::from_str(&puts[0]).unwrap();
        let subject = &crb.subjects.unwrap()[0];
        assert_eq!((subject.namespace.as_deref(), subject.name.as_str()), (Some("ns1"), "default"));

        let args = flagd(&spec).args.clone().unwrap();
        let idx = args.iter().position(|a| a == "--sources").unwrap();
        assert_eq!(args[idx + 1], r#"[{"uri":"other-ns/flag1","provider":"kubernetes"}]"#);
    }

    #[test]
    fn test_sidecar_args_optional_flags() {
        let spec = FeatureFlagSourceSpec {
            sync_provider_args: vec!["a=b".to_string()],
            debug_logging: Some(true),
            otel_collector_uri: Some("otel:4317".to_string()),
            ..Default::default()
        };

        let args = sidecar_args(&[], &spec).unwrap();

        assert_eq!(
            args,
            vec![
                "start",
                "--sync-provider-args",
                "a=b",
                "--debug",
                "--metrics-exporter",
                "otel",
                "--otel-collector-uri",
                "otel:4317"
            ]
        );
    }

    #[tokio::test]
    async fn test_sources_arg_preserves_declaration_order() {
        let (mut meta, mut spec) = pod();
        let mut fs = http_spec();
        fs.sources.push(Source {
            source: "grpc.example:9090".to_string(),
            provider: "grpc".to_string(),
            ..Default::default()
        });

        injector(&MockService::new()).inject(&mut meta, &mut spec, &fs).await.unwrap();

        let providers: Vec<_> = sources_arg(flagd(&spec))
            .into_iter()
            .map(|c| c.provider)
            .collect();
        assert_eq!(providers, vec!["http", "grpc"]);
    }

    #[tokio::test]
    async fn test_inject_uses_spec_resources() {
        let (mut meta, mut spec) = pod();
        let mut fs = http_spec();
        fs.resources = Some(crate::types::flag_source::SidecarResources {
            limits: Some(BTreeMap::from([("memory".to_string(), "128M".to_string())])),
            requests: None,
        });

        injector(&MockService::new()).inject(&mut meta, &mut spec, &fs).await.unwrap();

        let limits = flagd(&spec).resources.clone().unwrap().limits.unwrap();
        assert_eq!(limits.get("memory").unwrap().0, "128M");
    }
}
