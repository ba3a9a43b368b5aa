//! Integration tests for typedprompt
//!
//! These tests exercise the full validate -> resolve -> render pipeline.

use std::fs;
use std::sync::{Arc, Once};
use std::thread;

use serde_json::json;
use tempfile::TempDir;
use typedprompt::config::{Config, RenderConfig, TemplatesConfig};
use typedprompt::error::{FieldErrorKind, PromptError, RenderError, TemplateNotFoundError};
use typedprompt::prompt::{PromptCatalog, PromptDefinition, Role};
use typedprompt::schema::{Field, FieldType, Schema};
use typedprompt::template::{Renderer, TemplateRef, TemplateResolver};

static TRACING: Once = Once::new();

fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

fn name_schema() -> Schema {
    Schema::define([Field::string("name").build().expect("valid field")]).expect("valid schema")
}

// =============================================================================
// Pipeline Tests
// =============================================================================

#[test]
fn test_round_trip_scenario() {
    init_tracing();
    let prompt = PromptDefinition::new(name_schema(), "Hello, {{name}}!");

    assert_eq!(prompt.render(&json!({"name": "Ada"})).unwrap(), "Hello, Ada!");

    let err = prompt.render(&json!({})).unwrap_err();
    let failure = err.validation().expect("validation failure");
    assert_eq!(failure.errors().len(), 1);
    assert_eq!(failure.errors()[0].kind, FieldErrorKind::MissingField);
    assert_eq!(failure.errors()[0].path, "name");

    let err = prompt.render(&json!({"name": "Ada", "extra": 1})).unwrap_err();
    let failure = err.validation().expect("validation failure");
    assert_eq!(failure.unexpected(), vec!["extra"]);
}

#[test]
fn test_inheritance_scenario() {
    init_tracing();
    let base_schema =
        Schema::define([Field::string("greeting").default("Hi").build().unwrap()]).expect("valid schema");
    let base = PromptDefinition::new(base_schema, "{{greeting}}");

    let derived = base
        .derive(
            [
                Field::string("greeting").build().unwrap(),
                Field::string("name").build().unwrap(),
            ],
            Some(TemplateRef::inline("{{greeting}}, {{name}}")),
        )
        .expect("derive");

    let err = derived.render(&json!({"name": "Ada"})).unwrap_err();
    assert_eq!(err.validation().unwrap().missing(), vec!["greeting"]);
    assert_eq!(
        derived.render(&json!({"greeting": "Yo", "name": "Ada"})).unwrap(),
        "Yo, Ada"
    );
}

#[test]
fn test_override_drops_base_constraints() {
    let base_schema = Schema::define([Field::string("code").max_length(3).build().unwrap()]).unwrap();
    let derived = Schema::extend(&base_schema, [Field::string("code").build().unwrap()]).unwrap();

    let field = derived.get("code").unwrap();
    assert!(field.constraints().is_empty());

    let prompt = PromptDefinition::new(derived, "{{code}}");
    assert_eq!(prompt.render(&json!({"code": "ABCDEF"})).unwrap(), "ABCDEF");
}

#[test]
fn test_all_problems_reported_at_once() {
    let schema = Schema::define([
        Field::string("name").build().unwrap(),
        Field::integer("age").min(0.0).build().unwrap(),
        Field::string("tone").one_of(["formal", "casual"]).default("formal").build().unwrap(),
    ])
    .unwrap();
    let prompt = PromptDefinition::new(schema, "{{name}} {{age}} {{tone}}");

    let err = prompt
        .render(&json!({"age": "many", "tone": "angry", "colour": "blue"}))
        .unwrap_err();
    let failure = err.validation().unwrap();

    assert_eq!(failure.missing(), vec!["name"]);
    assert_eq!(failure.unexpected(), vec!["colour"]);
    assert!(failure.contains("age"));
    assert!(failure.contains("tone"));
    assert_eq!(failure.errors().len(), 4);
}

#[test]
fn test_real_world_article_scenario() {
    init_tracing();
    let article_config = Schema::define([
        Field::string("style").default("formal").build().unwrap(),
        Field::integer("max_length").default(1000).build().unwrap(),
        Field::boolean("include_examples").default(true).build().unwrap(),
    ])
    .unwrap();
    let schema = Schema::define([
        Field::string("author").build().unwrap(),
        Field::string("topic").build().unwrap(),
        Field::string("target_audience").build().unwrap(),
        Field::list("key_points", FieldType::String).optional().build().unwrap(),
        Field::string("technical_level").default("intermediate").build().unwrap(),
        Field::object("config", article_config).optional().build().unwrap(),
    ])
    .unwrap();

    let prompt = PromptDefinition::new(
        schema,
        r#"
        Please write an {{config.style}} article
        {{#if config.include_examples}}with practical examples{{/if}}
        within {{config.max_length}} words.
        "#,
    )
    .with_system_template(
        r#"
        You are helping {{author}} write an article about {{topic}}
        for {{target_audience}} audience at a {{technical_level}} level.
        {{#if key_points}}
        Key points to cover:
        {{#each key_points}}
        - {{this}}
        {{/each}}
        {{/if}}
        "#,
    );

    let rendered = prompt
        .render_prompt(&json!({
            "author": "Helen",
            "topic": "Rust Traits",
            "target_audience": "developers",
            "key_points": ["Basic syntax", "Generic types"],
            "technical_level": "advanced",
            "config": {"style": "technical", "max_length": 1500, "include_examples": true}
        }))
        .unwrap();

    let system = rendered.system.as_deref().expect("system prompt");
    assert!(system.starts_with("You are helping Helen"));
    assert!(system.contains("Rust Traits"));
    assert!(system.contains("- Basic syntax"));
    assert!(system.contains("- Generic types"));
    assert!(rendered.user.starts_with("Please write an technical article"));
    assert!(rendered.user.contains("1500"));
    assert!(rendered.user.contains("practical examples"));

    // Nested defaults fill in when the object is omitted
    let defaults = prompt
        .render(&json!({"author": "Helen", "topic": "Rust", "target_audience": "students"}))
        .unwrap();
    assert!(defaults.contains("formal"));
    assert!(defaults.contains("1000"));

    let messages = rendered.messages();
    assert_eq!(messages[0].role, Role::System);
    assert_eq!(messages[1].role, Role::User);
}

#[test]
fn test_nested_error_paths() {
    let inner = Schema::define([Field::string("style").build().unwrap()]).unwrap();
    let schema = Schema::define([
        Field::object("config", inner).build().unwrap(),
        Field::list("scores", FieldType::Integer).build().unwrap(),
    ])
    .unwrap();
    let prompt = PromptDefinition::new(schema, "{{config.style}}");

    let err = prompt
        .render(&json!({"config": {"style": 7, "colour": "red"}, "scores": [1, "two", 3]}))
        .unwrap_err();
    let failure = err.validation().unwrap();
    assert!(failure.contains("config.style"));
    assert!(failure.contains("config.colour"));
    assert!(failure.contains("scores[1]"));
}

#[test]
fn test_strict_undefined_surfaces_as_render_error() {
    let prompt = PromptDefinition::new(name_schema(), "Dear {{title}} {{name}}");
    let err = prompt.render(&json!({"name": "Ada"})).unwrap_err();
    assert!(matches!(err, PromptError::Render(RenderError::UndefinedVariable { .. })));
    assert!(!err.is_input_error());
}

#[test]
fn test_lenient_renderer() {
    let config = RenderConfig {
        strict_undefined: false,
        ..Default::default()
    };
    let prompt = PromptDefinition::new(name_schema(), "Dear {{title}} {{name}}")
        .with_renderer(Arc::new(Renderer::from_config(&config)));
    assert_eq!(prompt.render(&json!({"name": "Ada"})).unwrap(), "Dear  Ada");
}

// =============================================================================
// Template Resolution Tests
// =============================================================================

#[test]
fn test_file_backed_template() {
    init_tracing();
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let path = temp_dir.path().join("hello.pmt");
    fs::write(&path, "Hello from disk, {{name}}!\n").unwrap();

    let prompt = PromptDefinition::new(name_schema(), TemplateRef::path(&path));
    assert_eq!(prompt.render(&json!({"name": "Ada"})).unwrap(), "Hello from disk, Ada!");
}

#[test]
fn test_layout_inheritance_from_search_dir() {
    init_tracing();
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    fs::write(
        temp_dir.path().join("base.pmt"),
        "[{{> header}}] {{> body}} [end]",
    )
    .unwrap();
    fs::write(temp_dir.path().join("header.pmt"), "Assistant for {{name}}").unwrap();
    fs::write(
        temp_dir.path().join("task.pmt"),
        r#"{{#> base}}{{#*inline "body"}}Do the task, {{name}}.{{/inline}}{{/base}}"#,
    )
    .unwrap();

    let resolver = Arc::new(TemplateResolver::new().with_dir(temp_dir.path()));
    let resolved = resolver.resolve(&TemplateRef::named("task")).unwrap();
    assert_eq!(resolved.parent_chain(), vec!["base"]);

    let prompt = PromptDefinition::new(name_schema(), TemplateRef::named("task")).with_resolver(resolver);
    assert_eq!(
        prompt.render(&json!({"name": "Ada"})).unwrap(),
        "[Assistant for Ada] Do the task, Ada. [end]"
    );
}

#[test]
fn test_broken_chain_is_template_not_found() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    fs::write(temp_dir.path().join("page.pmt"), "{{> missing_footer}}").unwrap();

    let resolver = Arc::new(TemplateResolver::new().with_dir(temp_dir.path()));
    let prompt = PromptDefinition::new(name_schema(), TemplateRef::named("page")).with_resolver(resolver);

    let err = prompt.render(&json!({"name": "Ada"})).unwrap_err();
    match err {
        PromptError::TemplateNotFound(TemplateNotFoundError::Partial { name, referenced_by, .. }) => {
            assert_eq!(name, "missing_footer");
            assert_eq!(referenced_by, "named:page");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_reload_picks_up_changed_file() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let path = temp_dir.path().join("note.pmt");
    fs::write(&path, "v1 {{name}}").unwrap();

    let resolver = Arc::new(TemplateResolver::new().with_dir(temp_dir.path()));
    let prompt = PromptDefinition::new(name_schema(), TemplateRef::named("note")).with_resolver(resolver.clone());
    assert_eq!(prompt.render(&json!({"name": "Ada"})).unwrap(), "v1 Ada");

    fs::write(&path, "v2 {{name}}").unwrap();
    assert_eq!(prompt.render(&json!({"name": "Ada"})).unwrap(), "v1 Ada");

    resolver.reload();
    assert_eq!(prompt.render(&json!({"name": "Ada"})).unwrap(), "v2 Ada");
}

#[test]
fn test_concurrent_renders_share_cache() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    fs::write(temp_dir.path().join("greet.pmt"), "Hi {{name}}").unwrap();
    let config = TemplatesConfig {
        dirs: vec![temp_dir.path().to_path_buf()],
        ..Default::default()
    };
    let resolver = Arc::new(TemplateResolver::from_config(&config));
    let prompt = Arc::new(
        PromptDefinition::new(name_schema(), TemplateRef::named("greet")).with_resolver(resolver.clone()),
    );

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let prompt = prompt.clone();
            thread::spawn(move || prompt.render(&json!({"name": format!("user{}", i)})).unwrap())
        })
        .collect();

    for (i, handle) in handles.into_iter().enumerate() {
        assert_eq!(handle.join().unwrap(), format!("Hi user{}", i));
    }
    assert_eq!(resolver.cache().map(|c| c.len()), Some(1));
}

// =============================================================================
// Catalog Tests
// =============================================================================

#[test]
fn test_catalog_from_directory() {
    init_tracing();
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let templates = temp_dir.path().join("templates");
    fs::create_dir(&templates).unwrap();
    fs::write(templates.join("frame.pmt"), "== {{> content}} ==").unwrap();
    fs::write(temp_dir.path().join("bullets.pmt"), "{{#each bullets}}* {{this}}\n{{/each}}").unwrap();

    fs::write(
        temp_dir.path().join("prompts.yml"),
        r#"
summarize:
  description: Summarize an article
  fields:
    - name: article
      min-length: 1
    - name: max_words
      type: integer
      default: 100
      min: 10
  system-template: You are a careful editor.
  template: "Summarize in at most {{max_words}} words: {{article}}"

summarize_bullets:
  extends: summarize
  fields:
    - name: bullets
      type: list[string]
      required: false
  template-file: bullets.pmt

framed:
  fields:
    - name: text
  template: '{{#> frame}}{{#*inline "content"}}{{text}}{{/inline}}{{/frame}}'
"#,
    )
    .unwrap();

    let config = Config {
        templates: TemplatesConfig {
            dirs: vec![templates],
            ..Default::default()
        },
        ..Default::default()
    };
    let mut catalog = PromptCatalog::new(&config);
    catalog.load_dir(temp_dir.path()).expect("load catalog");

    assert_eq!(
        catalog.names().collect::<Vec<_>>(),
        vec!["framed", "summarize", "summarize_bullets"]
    );

    let rendered = catalog
        .render_prompt("summarize", &json!({"article": "Rust is fast."}))
        .unwrap();
    assert_eq!(rendered.system.as_deref(), Some("You are a careful editor."));
    assert_eq!(rendered.user, "Summarize in at most 100 words: Rust is fast.");

    let bullets = catalog
        .render("summarize_bullets", &json!({"article": "x", "bullets": ["one", "two"]}))
        .unwrap();
    assert_eq!(bullets, "* one\n* two");

    let framed = catalog.render("framed", &json!({"text": "inside"})).unwrap();
    assert_eq!(framed, "== inside ==");

    let err = catalog
        .render("summarize", &json!({"article": "", "max_words": 5}))
        .unwrap_err();
    let failure = err
        .downcast_ref::<PromptError>()
        .and_then(|e| e.validation())
        .expect("validation failure");
    assert!(failure.contains("article"));
    assert!(failure.contains("max_words"));
}

#[test]
fn test_config_file_drives_catalog() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let config_path = temp_dir.path().join("typedprompt.yml");
    fs::write(
        &config_path,
        "templates:\n  extension: hbs\nrender:\n  escape: html\n",
    )
    .unwrap();
    let config = Config::load(Some(&config_path)).expect("load config");

    let mut catalog = PromptCatalog::new(&config);
    catalog
        .load_str("snippet:\n  fields:\n    - name: code\n  template: \"{{code}}\"\n", None, None)
        .unwrap();
    assert_eq!(
        catalog.render("snippet", &json!({"code": "a < b"})).unwrap(),
        "a &lt; b"
    );
}
