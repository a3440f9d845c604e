//! Tests for TemplateService

use std::collections::BTreeMap;

use serde_json::{json, Value};

use rsjobs::application::services::{Axis, TemplateService};
use rsjobs::application::ApplicationError;
use rsjobs::config::ExpanderConfig;
use rsjobs::domain::{
    Definition, DomainError, Group, Location, Node, Params, Project, Spec, Template,
};
use rsjobs::util::testing;

fn params(value: Value) -> Params {
    serde_json::from_value(value).expect("params from json")
}

fn node(value: Value) -> Node {
    serde_json::from_value(value).expect("node from json")
}

fn service() -> TemplateService {
    testing::init_test_setup();
    TemplateService::new(&ExpanderConfig::default())
}

fn names(items: &[rsjobs::domain::Item]) -> Vec<&str> {
    items.iter().map(|item| item.name.as_str()).collect()
}

#[test]
fn given_template_without_axes_when_instantiating_then_yields_one_item() {
    // Arrange
    let template = Template::new("deploy")
        .with_param("env", "prod")
        .with_body("command", "deploy --env {env} --from {template-name}");

    // Act
    let items = service().instantiate(&template, &Params::new(), &Params::new()).unwrap();

    // Assert
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].name, "deploy");
    assert_eq!(
        items[0].contents,
        node(json!({"name": "deploy", "command": "deploy --env prod --from deploy"}))
    );
}

#[test]
fn given_matrix_template_when_instantiating_then_yields_points_in_order() {
    // Arrange
    let template = Template::new("build-{branch}-{platform}")
        .with_params(params(json!({
            "branch": ["main", "dev"],
            "platform": ["linux", "mac"],
        })))
        .with_body("label", "{platform}");

    // Act
    let items = service().instantiate(&template, &Params::new(), &Params::new()).unwrap();

    // Assert
    assert_eq!(
        names(&items),
        vec![
            "build-main-linux",
            "build-main-mac",
            "build-dev-linux",
            "build-dev-mac",
        ]
    );
    assert_eq!(items[1].contents.as_map().unwrap()["label"], Node::from("mac"));
}

#[test]
fn given_exclude_param_when_instantiating_then_drops_matching_points() {
    // Arrange
    let template = Template::new("build-{branch}-{platform}").with_params(params(json!({
        "branch": ["main", "dev"],
        "platform": ["linux", "mac"],
        "exclude": [{"branch": "dev", "platform": "mac"}],
    })));

    // Act
    let items = service().instantiate(&template, &Params::new(), &Params::new()).unwrap();

    // Assert
    assert_eq!(
        names(&items),
        vec!["build-main-linux", "build-main-mac", "build-dev-linux"]
    );
}

#[test]
fn given_exclude_on_derived_param_when_instantiating_then_uses_resolved_values() {
    let template = Template::new("job-{os}").with_params(params(json!({
        "os": ["linux", "win"],
        "family": "{os}-family",
        "exclude": [{"family": "win-family"}],
    })));

    let items = service().instantiate(&template, &Params::new(), &Params::new()).unwrap();

    assert_eq!(names(&items), vec!["job-linux"]);
}

#[test]
fn given_axis_default_in_name_when_instantiating_then_default_is_used() {
    let template = Template::new("build-{platform|linux}");

    let items = service().instantiate(&template, &Params::new(), &Params::new()).unwrap();

    assert_eq!(names(&items), vec!["build-linux"]);
}

#[test]
fn given_base_params_when_instantiating_then_template_params_win() {
    // Arrange
    let base = params(json!({"owner": "ops", "team": "base"}));
    let template = Template::new("job")
        .with_param("team", "dev")
        .with_body("who", "{owner}/{team}");

    // Act
    let items = service().instantiate(&template, &base, &Params::new()).unwrap();

    // Assert
    assert_eq!(items[0].contents.as_map().unwrap()["who"], Node::from("ops/dev"));
    assert_eq!(items[0].params["template-name"], Node::from("job"));
}

#[test]
fn given_point_spec_params_when_instantiating_then_point_params_apply() {
    let template = Template::new("test-{suite}")
        .with_params(params(json!({
            "suite": [{"unit": {"timeout": 10}}, "integration"],
            "timeout": 60,
        })))
        .with_body("timeout", "{timeout}");

    let items = service().instantiate(&template, &Params::new(), &Params::new()).unwrap();

    let timeouts: Vec<&Node> = items
        .iter()
        .map(|item| &item.contents.as_map().unwrap()["timeout"])
        .collect();
    assert_eq!(timeouts, vec![&Node::Int(10), &Node::Int(60)]);
}

#[test]
fn given_failing_template_with_location_when_instantiating_then_error_is_located() {
    // Arrange
    let template = Template::new("job-{missing}")
        .with_body("x", "{undefined}")
        .with_location(Location::new("jobs.toml").at(4, 8));

    // Act
    let err = service().instantiate(&template, &Params::new(), &Params::new()).unwrap_err();

    // Assert
    match err {
        ApplicationError::Domain(DomainError::Located { location, cause }) => {
            assert_eq!(location.to_string(), "jobs.toml:4:8");
            assert!(matches!(cause.root_cause(), DomainError::UndefinedVariable { .. }));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn given_cyclic_params_when_instantiating_then_recursive_parameter() {
    let template = Template::new("job").with_params(params(json!({"a": "{b}", "b": "{a}"})));

    let err = service().instantiate(&template, &Params::new(), &Params::new()).unwrap_err();

    assert!(
        matches!(
            err,
            ApplicationError::Domain(DomainError::RecursiveParameter { .. })
        ),
        "got {err:?}"
    );
}

#[test]
fn given_allow_empty_config_when_instantiating_then_undefined_becomes_empty() {
    let service = TemplateService::new(&ExpanderConfig {
        allow_empty_variables: true,
        allow_duplicates: false,
    });
    let template = Template::new("job").with_body("x", "[{undefined}]");

    let items = service.instantiate(&template, &Params::new(), &Params::new()).unwrap();

    assert_eq!(items[0].contents.as_map().unwrap()["x"], Node::from("[]"));
}

#[test]
fn given_spec_params_when_instantiating_then_they_override_template_params() {
    // Arrange
    let defaults = params(json!({"team": "base", "owner": "ops"}));
    let template = Template::new("job-{team}")
        .with_param("team", "dev")
        .with_body("owner", "{owner}");

    // Act
    let items = service()
        .instantiate(&template, &defaults, &params(json!({"team": "qa"})))
        .unwrap();

    // Assert
    assert_eq!(names(&items), vec!["job-qa"]);
    assert_eq!(items[0].contents.as_map().unwrap()["owner"], Node::from("ops"));
}

#[test]
fn given_template_with_id_when_instantiating_then_id_param_is_set() {
    let template = Template::new("job")
        .with_id("job-by-id")
        .with_body("ref", "{id}");

    let items = service()
        .instantiate(&template, &Params::new(), &Params::new())
        .unwrap();

    assert_eq!(items[0].contents.as_map().unwrap()["ref"], Node::from("job-by-id"));
}

// ============================================================
// expand_project() / expand_all()
// ============================================================

fn defaults_sets(value: Value) -> BTreeMap<String, Params> {
    serde_json::from_value(value).expect("defaults from json")
}

#[test]
fn given_project_using_template_twice_when_expanding_then_each_use_has_own_params() {
    // Arrange
    let project = Project {
        templates: vec![Template::new("deploy-{env}").with_body("target", "{name}/{env}")],
        projects: vec![Group::new("shop")
            .with_spec(Spec::new("deploy-{env}").with_param("env", "staging"))
            .with_spec(Spec::new("deploy-{env}").with_param("env", "prod"))],
        ..Project::default()
    };

    // Act
    let items = service().expand_all(&project).unwrap();

    // Assert
    assert_eq!(names(&items), vec!["deploy-staging", "deploy-prod"]);
    assert_eq!(
        items[1].contents.as_map().unwrap()["target"],
        Node::from("shop/prod")
    );
}

#[test]
fn given_unreferenced_template_when_expanding_all_then_it_yields_nothing() {
    let project = Project {
        templates: vec![Template::new("orphan")],
        items: vec![Definition::new("plain")],
        ..Project::default()
    };

    let items = service().expand_all(&project).unwrap();

    assert_eq!(names(&items), vec!["plain"]);
}

#[test]
fn given_named_defaults_when_expanding_then_merged_over_global() {
    // Arrange
    let project = Project {
        defaults: defaults_sets(json!({
            "global": {"branch": "main", "owner": "ops"},
            "release": {"branch": "stable"},
        })),
        templates: vec![
            Template::new("a").with_body("ref", "{owner}@{branch}"),
            Template::new("b")
                .with_defaults("release")
                .with_body("ref", "{owner}@{branch}"),
        ],
        projects: vec![Group::new("p")
            .with_spec(Spec::new("a"))
            .with_spec(Spec::new("b"))],
        ..Project::default()
    };

    // Act
    let items = service().expand_all(&project).unwrap();

    // Assert
    let refs: Vec<&Node> = items
        .iter()
        .map(|item| &item.contents.as_map().unwrap()["ref"])
        .collect();
    assert_eq!(refs, vec![&Node::from("ops@main"), &Node::from("ops@stable")]);
}

#[test]
fn given_project_defaults_when_expanding_then_they_replace_template_choice() {
    let project = Project {
        defaults: defaults_sets(json!({"release": {"branch": "stable"}, "dev": {"branch": "next"}})),
        templates: vec![Template::new("a")
            .with_defaults("dev")
            .with_body("ref", "{branch}")],
        projects: vec![Group::new("p")
            .with_defaults("release")
            .with_spec(Spec::new("a"))],
        ..Project::default()
    };

    let items = service().expand_all(&project).unwrap();

    assert_eq!(items[0].contents.as_map().unwrap()["ref"], Node::from("stable"));
}

#[test]
fn given_missing_defaults_set_when_expanding_then_undefined_defaults() {
    let project = Project {
        templates: vec![Template::new("a").with_defaults("nope")],
        projects: vec![Group::new("p").with_spec(Spec::new("a"))],
        ..Project::default()
    };

    let err = service().expand_all(&project).unwrap_err();

    assert_eq!(
        err.to_string(),
        "template 'a' wants defaults 'nope' but it was never defined"
    );
}

#[test]
fn given_nested_groups_when_expanding_then_params_layer_outside_in() {
    // Arrange
    let project = Project {
        templates: vec![Template::new("job-{os}-{arch}")
            .with_param("arch", "x86")
            .with_body("owner", "{owner}")],
        groups: vec![
            Group::new("outer")
                .with_param("owner", "outer")
                .with_spec(Spec::new("inner").with_param("os", "linux")),
            Group::new("inner")
                .with_param("owner", "inner")
                .with_spec(Spec::new("job-{os}-{arch}"))
                .with_spec(Spec::new("job-{os}-{arch}").with_param("arch", "arm")),
        ],
        projects: vec![Group::new("p")
            .with_param("owner", "project")
            .with_spec(Spec::new("outer"))],
        ..Project::default()
    };

    // Act
    let items = service().expand_all(&project).unwrap();

    // Assert
    assert_eq!(names(&items), vec!["job-linux-x86", "job-linux-arm"]);
    assert_eq!(items[0].contents.as_map().unwrap()["owner"], Node::from("inner"));
}

#[test]
fn given_self_referencing_group_when_expanding_then_recursive_group() {
    let project = Project {
        groups: vec![
            Group::new("a").with_spec(Spec::new("b")),
            Group::new("b").with_spec(Spec::new("a")),
        ],
        projects: vec![Group::new("p").with_spec(Spec::new("a"))],
        ..Project::default()
    };

    let err = service().expand_all(&project).unwrap_err();

    assert_eq!(
        err.to_string(),
        "project 'p': recursive group usage: a -> b -> a"
    );
}

#[test]
fn given_unknown_spec_when_expanding_then_names_the_owner() {
    let project = Project {
        groups: vec![Group::new("g").with_spec(Spec::new("missing"))],
        projects: vec![Group::new("p").with_spec(Spec::new("g"))],
        ..Project::default()
    };

    let err = service().expand_all(&project).unwrap_err();

    assert!(matches!(
        err,
        ApplicationError::Domain(DomainError::UnknownSpec { ref context, ref name })
            if context == "group 'g'" && name == "missing"
    ));
}

#[test]
fn given_spec_naming_plain_item_when_expanding_then_item_is_only_expanded_once() {
    let project = Project {
        items: vec![Definition::new("plain")],
        projects: vec![Group::new("p").with_spec(Spec::new("plain"))],
        ..Project::default()
    };

    let items = service().expand_all(&project).unwrap();

    assert_eq!(names(&items), vec!["plain"]);
}

fn project_with_duplicates() -> Project {
    Project {
        defaults: defaults_sets(json!({"global": {"suffix": "a"}})),
        templates: vec![
            Template::new("job-{suffix}").with_id("first").with_body("origin", "first"),
            Template::new("job-{suffix}").with_id("second").with_body("origin", "second"),
        ],
        items: vec![Definition::new("plain").with_body("cmd", "{kept}")],
        projects: vec![Group::new("p")
            .with_spec(Spec::new("first"))
            .with_spec(Spec::new("second"))],
        ..Project::default()
    }
}

#[test]
fn given_duplicate_names_when_expanding_all_then_fails() {
    let err = service().expand_all(&project_with_duplicates()).unwrap_err();

    assert!(matches!(err, ApplicationError::DuplicateItem { ref name } if name == "job-a"));
}

#[test]
fn given_allow_duplicates_when_expanding_all_then_last_definition_wins() {
    // Arrange
    testing::init_test_setup();
    let service = TemplateService::new(&ExpanderConfig {
        allow_empty_variables: false,
        allow_duplicates: true,
    });

    // Act
    let items = service.expand_all(&project_with_duplicates()).unwrap();

    // Assert
    assert_eq!(names(&items), vec!["plain", "job-a"]);
    assert_eq!(
        items[1].contents.as_map().unwrap()["origin"],
        Node::from("second")
    );
    assert_eq!(items[0].contents.as_map().unwrap()["cmd"], Node::from("{kept}"));
}

#[test]
fn given_plain_definition_when_expanding_then_tags_are_flattened() {
    let definition = Definition::new("nightly").with_body(
        "script",
        node(json!({"!join": {"delimiter": " && ", "items": ["make", "make test"]}})),
    );

    let item = service().expand_definition(&definition).unwrap();

    assert_eq!(
        item.contents,
        node(json!({"name": "nightly", "script": "make && make test"}))
    );
}

// ============================================================
// axes() / format()
// ============================================================

#[test]
fn given_template_name_when_listing_axes_then_includes_defaults() {
    let axes = service().axes("build-{branch}-{platform|linux}").unwrap();

    assert_eq!(
        axes,
        vec![
            Axis {
                name: "branch".to_string(),
                default: None
            },
            Axis {
                name: "platform".to_string(),
                default: Some("linux".to_string())
            },
        ]
    );
}

#[test]
fn given_template_string_when_formatting_then_delegates_to_formatter() {
    let result = service()
        .format("{greeting}, {name:>6}!", &params(json!({"greeting": "hi", "name": "bob"})))
        .unwrap();

    assert_eq!(result, Node::from("hi,    bob!"));
}
