// SPDX-License-Identifier: MIT

//! Deterministic config -> argv mapping (spec §4.1 "Argv construction").

use serde_json::{Map, Value};
use vg_core::ScanConfig;

/// Strip the `probes.`/`detectors.`/`buffs.` prefix before comma-joining
/// list-valued flags.
fn strip_prefix(name: &str) -> &str {
    for prefix in ["probes.", "detectors.", "buffs."] {
        if let Some(stripped) = name.strip_prefix(prefix) {
            return stripped;
        }
    }
    name
}

fn join_list(names: &[String]) -> String {
    names.iter().map(|n| strip_prefix(n)).collect::<Vec<_>>().join(",")
}

/// Build the `garak` argv for `config`. Deterministic for a given config:
/// callers may rely on two calls with equal configs producing equal argv.
pub fn build(config: &ScanConfig, generator_host_override: Option<&str>) -> Vec<String> {
    let mut argv = Vec::new();

    argv.push("--target_type".to_string());
    argv.push(config.target_type.clone());
    argv.push("--target_name".to_string());
    argv.push(config.target_name.clone());

    if !config.probes.is_empty() {
        argv.push("--probes".to_string());
        argv.push(join_list(&config.probes));
    }
    if !config.detectors.is_empty() {
        argv.push("--detectors".to_string());
        argv.push(join_list(&config.detectors));
    }
    if !config.buffs.is_empty() {
        argv.push("--buffs".to_string());
        argv.push(join_list(&config.buffs));
    }
    if let Some(tags) = &config.probe_tags {
        if !tags.is_empty() {
            argv.push("--probe_tags".to_string());
            argv.push(join_list(tags));
        }
    }
    if let Some(excl) = &config.exclude_probes {
        if !excl.is_empty() {
            argv.push("--exclude_probes".to_string());
            argv.push(join_list(excl));
        }
    }
    if let Some(excl) = &config.exclude_detectors {
        if !excl.is_empty() {
            argv.push("--exclude_detectors".to_string());
            argv.push(join_list(excl));
        }
    }

    argv.push("--generations".to_string());
    argv.push(config.generations.to_string());
    argv.push("--eval_threshold".to_string());
    argv.push(config.eval_threshold.to_string());

    if let Some(seed) = config.seed {
        argv.push("--seed".to_string());
        argv.push(seed.to_string());
    }
    if let Some(n) = config.parallel_requests {
        argv.push("--parallel_requests".to_string());
        argv.push(n.to_string());
    }
    if let Some(n) = config.parallel_attempts {
        argv.push("--parallel_attempts".to_string());
        argv.push(n.to_string());
    }
    if let Some(prompt) = &config.system_prompt {
        argv.push("--system_prompt".to_string());
        argv.push(prompt.clone());
    }
    if let Some(t) = config.timeout_per_probe {
        argv.push("--timeout_per_probe".to_string());
        argv.push(t.to_string());
    }
    if let Some(r) = config.report_threshold {
        argv.push("--report_threshold".to_string());
        argv.push(r.to_string());
    }
    if let Some(h) = config.hit_rate {
        argv.push("--hit_rate".to_string());
        argv.push(h.to_string());
    }
    if let Some(dir) = &config.output_dir {
        argv.push("--output_dir".to_string());
        argv.push(dir.clone());
    }
    if let Some(path) = &config.config_file {
        argv.push("--config".to_string());
        argv.push(path.clone());
    }

    if config.deprefix {
        argv.push("--deprefix".to_string());
    }
    if config.extended_detectors {
        argv.push("--extended_detectors".to_string());
    }
    if config.skip_unknown {
        argv.push("--skip_unknown".to_string());
    }
    if config.continue_on_error {
        argv.push("--continue_on_error".to_string());
    }
    if config.collect_timing {
        argv.push("--collect_timing".to_string());
    }
    if config.no_report {
        argv.push("--no_report".to_string());
    }

    if config.verbose > 0 {
        argv.push(format!("-{}", "v".repeat(config.verbose as usize)));
    }

    if let Some(opts) = build_generator_options(config, generator_host_override) {
        argv.push("--generator_options".to_string());
        argv.push(opts);
    }
    if !config.probe_options.is_empty() {
        let value = Value::Object(
            config
                .probe_options
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        );
        argv.push("--probe_options".to_string());
        argv.push(value.to_string());
    }

    argv
}

/// Known generator families whose `host` option accepts an environment
/// override (spec §4.1 "inject it into the corresponding options object
/// only if the user did not already set `host`").
fn generator_family(target_type: &str) -> Option<&'static str> {
    match target_type {
        "ollama" => Some("ollama"),
        _ => None,
    }
}

fn build_generator_options(config: &ScanConfig, host_override: Option<&str>) -> Option<String> {
    if config.generator_options.is_empty() && host_override.is_none() {
        return None;
    }

    let family = generator_family(&config.target_type);
    let mut root: Map<String, Value> = config
        .generator_options
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    // Already nested under the generator type? Leave as-is. Otherwise wrap.
    let already_nested = family.is_some_and(|f| root.contains_key(f));
    let mut wrapped = if let (Some(family), false) = (family, already_nested) {
        if root.is_empty() {
            Map::new()
        } else {
            let mut outer = Map::new();
            outer.insert(family.to_string(), Value::Object(root.clone()));
            root = outer;
        }
        root
    } else {
        root
    };

    if let (Some(family), Some(host)) = (family, host_override) {
        let inner = wrapped
            .entry(family.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(inner_map) = inner {
            inner_map.entry("host".to_string()).or_insert_with(|| Value::String(host.to_string()));
        }
    }

    if wrapped.is_empty() {
        None
    } else {
        Some(Value::Object(wrapped).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vg_core::scan_config::tests_support::minimal;

    #[test]
    fn always_emits_target_flags() {
        let argv = build(&minimal(), None);
        assert_eq!(argv[0], "--target_type");
        assert_eq!(argv[1], "ollama");
        assert_eq!(argv[2], "--target_name");
        assert_eq!(argv[3], "llama3.2:3b");
    }

    #[test]
    fn strips_probes_prefix_and_comma_joins() {
        let mut cfg = minimal();
        cfg.probes = vec!["probes.dan".into(), "encoding".into()];
        let argv = build(&cfg, None);
        let idx = argv.iter().position(|a| a == "--probes").unwrap();
        assert_eq!(argv[idx + 1], "dan,encoding");
    }

    #[test]
    fn verbose_repeats_v_flag() {
        let mut cfg = minimal();
        cfg.verbose = 3;
        let argv = build(&cfg, None);
        assert!(argv.contains(&"-vvv".to_string()));
    }

    #[test]
    fn boolean_flags_only_emitted_when_true() {
        let cfg = minimal();
        let argv = build(&cfg, None);
        assert!(!argv.iter().any(|a| a == "--deprefix"));
    }

    #[test]
    fn host_override_injected_only_if_absent() {
        let mut cfg = minimal();
        let argv = build(&cfg, Some("http://ollama:11434"));
        let idx = argv.iter().position(|a| a == "--generator_options").unwrap();
        assert!(argv[idx + 1].contains(r#""host":"http://ollama:11434""#));

        cfg.generator_options.insert(
            "ollama".into(),
            serde_json::json!({"host": "http://already-set:1"}),
        );
        let argv = build(&cfg, Some("http://ollama:11434"));
        let idx = argv.iter().position(|a| a == "--generator_options").unwrap();
        assert!(argv[idx + 1].contains("already-set"));
        assert!(!argv[idx + 1].contains("11434"));
    }

    #[test]
    fn argv_is_deterministic_for_same_config() {
        let cfg = minimal();
        assert_eq!(build(&cfg, None), build(&cfg, None));
    }

    proptest::proptest! {
        #[test]
        fn argv_build_never_panics(generations in 1u32..=500, verbose in 0u8..=3) {
            let mut cfg = minimal();
            cfg.generations = generations;
            cfg.verbose = verbose;
            let _ = build(&cfg, None);
        }
    }
}
