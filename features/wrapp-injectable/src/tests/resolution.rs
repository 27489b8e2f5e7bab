use std::{convert::Infallible, sync::Arc, thread};

use super::{value, Counter};
use crate::{Container, InjectError, Injectable, InjectionToken, KeyPart};

struct Service;

fn counted_service(id: &str, created: &Counter) -> Injectable<Arc<Service>> {
    let created = created.clone();
    Injectable::singleton(id, move |_| {
        created.hit();
        Ok::<_, Infallible>(Arc::new(Service))
    })
}

#[test]
fn singleton_is_created_once() -> Result<(), InjectError> {
    let created = Counter::default();
    let service = counted_service("service", &created);
    let container = Container::new("container");
    container.register(&service)?;

    let first = container.inject(&service)?;
    let second = container.inject(&service)?;

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(created.count(), 1);
    assert_eq!(container.get_instances(&service)?.len(), 1);
    Ok(())
}

#[test]
fn transient_is_created_on_every_injection() -> Result<(), InjectError> {
    let service = Injectable::transient("service", |_| Ok::<_, Infallible>(Arc::new(Service)));
    let container = Container::new("container");
    container.register(&service)?;

    let first = container.inject(&service)?;
    let second = container.inject(&service)?;

    assert!(!Arc::ptr_eq(&first, &second));
    assert!(container.get_instances(&service)?.is_empty());
    Ok(())
}

#[test]
fn keyed_singleton_caches_per_key() -> Result<(), InjectError> {
    let session = Injectable::keyed_singleton(
        "session",
        |_, user: &String| Ok(vec![KeyPart::from(user)]),
        |_, user: String| Ok::<_, Infallible>(Arc::new(user)),
    );
    let container = Container::new("container");
    container.register(&session)?;

    let alice = container.inject_with(&session, "alice".to_string())?;
    let again = container.inject_with(&session, "alice".to_string())?;
    let bob = container.inject_with(&session, "bob".to_string())?;

    assert!(Arc::ptr_eq(&alice, &again));
    assert!(!Arc::ptr_eq(&alice, &bob));
    assert_eq!(*bob, "bob");
    assert_eq!(container.get_instances(&session)?.len(), 2);
    Ok(())
}

#[test]
fn keyed_singleton_with_composite_key() -> Result<(), InjectError> {
    let release = Injectable::keyed_singleton(
        "release",
        |_, (name, version): &(String, u32)| Ok(vec![KeyPart::from(name), KeyPart::from(*version)]),
        |_, (name, version): (String, u32)| Ok::<_, Infallible>(Arc::new(format!("{name}@{version}"))),
    );
    let container = Container::new("container");
    container.register(&release)?;

    let first = container.inject_with(&release, ("core".to_string(), 1))?;
    let same = container.inject_with(&release, ("core".to_string(), 1))?;
    let other_version = container.inject_with(&release, ("core".to_string(), 2))?;
    let other_name = container.inject_with(&release, ("cli".to_string(), 1))?;

    assert!(Arc::ptr_eq(&first, &same));
    assert!(!Arc::ptr_eq(&first, &other_version));
    assert!(!Arc::ptr_eq(&first, &other_name));
    assert_eq!(*other_version, "core@2");
    Ok(())
}

#[test]
fn keyed_singleton_rejects_empty_key() -> Result<(), InjectError> {
    let keyless = Injectable::keyed_singleton(
        "keyless",
        |_, _: &u32| Ok(Vec::new()),
        |_, number: u32| Ok::<_, Infallible>(number),
    );
    let parent = Injectable::singleton("parent", {
        let keyless = keyless.clone();
        move |di| di.inject_with(&keyless, 1)
    });
    let container = Container::new("container");
    container.register_all(&[&keyless, &parent])?;

    let error = container.inject(&parent).unwrap_err();

    assert!(matches!(error, InjectError::InvalidKey { .. }));
    assert_eq!(
        error.to_string(),
        r#"Keys must be at least length 1 (injecting "container" -> "parent" -> "keyless")"#
    );
    Ok(())
}

#[test]
fn injecting_unregistered_injectable_fails() {
    let missing = value("missing", "never");
    let container = Container::new("container");

    let error = container.inject(&missing).unwrap_err();

    assert!(matches!(error, InjectError::NotRegistered { .. }));
    assert_eq!(
        error.to_string(),
        r#"Tried to inject non-registered injectable "container" -> "missing"."#
    );
    assert!(container.inject_many(&missing).unwrap().is_empty());
}

#[test]
fn token_resolves_its_implementations() -> Result<(), InjectError> {
    let greeters = InjectionToken::<String>::new("greeter");
    let english = value("english", "hello").implements(&greeters);
    let german = value("german", "hallo").implements(&greeters);
    let container = Container::new("container");
    container.register_all(&[&english, &german])?;

    assert_eq!(container.inject_many(&greeters)?, ["hello", "hallo"]);

    let error = container.inject(&greeters).unwrap_err();
    assert!(matches!(
        &error,
        InjectError::TooManyMatches { matches, .. } if matches == &["english", "german"]
    ));
    assert_eq!(
        error.to_string(),
        r#"Tried to inject single injectable for injection token "greeter" but found multiple injectables: "english", "german" (injecting "container" -> "greeter")"#
    );
    Ok(())
}

#[test]
fn too_many_matches_names_the_whole_chain() -> Result<(), InjectError> {
    let greeters = InjectionToken::<String>::new("greeter");
    let english = value("english", "hello").implements(&greeters);
    let german = value("german", "hallo").implements(&greeters);
    let parent = Injectable::singleton("parent", {
        let greeters = greeters.clone();
        move |di| di.inject(&greeters)
    });
    let container = Container::new("container");
    container.register_all(&[&english, &german, &parent])?;

    let error = container.inject(&parent).unwrap_err();

    assert_eq!(
        error.to_string(),
        r#"Tried to inject single injectable for injection token "greeter" but found multiple injectables: "english", "german" (injecting "container" -> "parent" -> "greeter")"#
    );
    Ok(())
}

#[test]
fn token_without_implementations() {
    let greeters = InjectionToken::<String>::new("greeter");
    let container = Container::new("container");

    assert!(!container.has_registrations(&greeters));
    assert!(container.inject_many(&greeters).unwrap().is_empty());
    assert_eq!(
        container.inject(&greeters).unwrap_err().to_string(),
        r#"Tried to inject non-registered injectable "container" -> "greeter"."#
    );
}

#[test]
fn single_implementation_resolves_through_token() -> Result<(), InjectError> {
    let greeters = InjectionToken::<String>::new("greeter");
    let english = value("english", "hello").implements(&greeters);
    let container = Container::new("container");
    container.register(&english)?;

    let greeting = container.inject_with_meta(&greeters, ())?;

    assert_eq!(greeting.instance, "hello");
    assert_eq!(greeting.meta.id, "english");
    Ok(())
}

#[test]
fn general_token_finds_specific_implementations() -> Result<(), InjectError> {
    let plugins = InjectionToken::<String>::new("plugin");
    let audio = plugins.specific("audio");
    let mixer = value("mixer", "mixer").implements(&audio);
    let logger = value("logger", "logger").implements(&plugins);
    let container = Container::new("container");
    container.register_all(&[&mixer, &logger])?;

    assert!(Arc::ptr_eq(audio.def(), plugins.specific("audio").def()));
    assert_eq!(audio.id(), "plugin:audio");
    assert_eq!(audio.def().speciality(), Some("audio"));

    assert_eq!(container.inject_many(&plugins)?, ["mixer", "logger"]);
    assert_eq!(container.inject(&audio)?, "mixer");
    Ok(())
}

#[test]
fn many_with_meta_reports_namespaced_ids() -> Result<(), InjectError> {
    let greeters = InjectionToken::<String>::new("greeter");
    let english = value("english", "hello").implements(&greeters);
    let german = value("german", "hallo").implements(&greeters);
    let container = Container::new("container");
    container.register_all(&[&english, &german])?;

    let ids = container
        .inject_many_with_meta(&greeters, ())?
        .into_iter()
        .map(|with_meta| with_meta.meta.id)
        .collect::<Vec<_>>();

    assert_eq!(ids, ["english", "german"]);
    Ok(())
}

#[test]
fn parameters_are_passed_to_dependencies() -> Result<(), InjectError> {
    let greeting = Injectable::transient_with("greeting", |_, name: String| {
        Ok::<_, Infallible>(format!("hello {name}"))
    });
    let welcome = Injectable::singleton("welcome", {
        let greeting = greeting.clone();
        move |di| di.inject_with(&greeting, "world".to_string())
    });
    let container = Container::new("container");
    container.register_all(&[&greeting, &welcome])?;

    assert_eq!(container.inject(&welcome)?, "hello world");
    Ok(())
}

#[test]
fn factory_resolves_on_every_call() -> Result<(), InjectError> {
    let double = Injectable::transient_with("double", |_, number: u32| Ok::<_, Infallible>(number * 2));
    let container = Container::new("container");
    container.register(&double)?;

    let factory = container.inject_factory(&double);

    assert_eq!(factory(2)?, 4);
    assert_eq!(factory(5)?, 10);
    Ok(())
}

#[test]
fn side_effects_can_be_prevented_and_permitted() -> Result<(), InjectError> {
    let mailer = value("mailer", "sent").causes_side_effects();
    let pure = value("pure", "pure");
    let container = Container::new("container");
    container.register_all(&[&mailer, &pure])?;

    container.prevent_side_effects();

    let error = container.inject(&mailer).unwrap_err();
    assert_eq!(
        error.to_string(),
        r#"Tried to inject "container" -> "mailer" when side-effects are prevented."#
    );
    assert_eq!(container.inject(&pure)?, "pure");

    container.permit_side_effects(&mailer);
    assert_eq!(container.inject(&mailer)?, "sent");
    Ok(())
}

#[test]
fn changed_clone_is_a_separate_injectable() -> Result<(), InjectError> {
    let base = value("mailer", "sent");
    let gated = base.clone().causes_side_effects();
    let container = Container::new("container");
    container.register(&gated)?;
    container.prevent_side_effects();

    assert!(matches!(
        container.inject(&gated),
        Err(InjectError::SideEffectsPrevented { .. })
    ));
    assert!(matches!(
        container.inject(&base),
        Err(InjectError::NotRegistered { .. })
    ));
    assert!(matches!(
        container.register(&base),
        Err(InjectError::DuplicateRegistration {
            same_injectable: false,
            ..
        })
    ));
    Ok(())
}

#[test]
fn ad_hoc_injectable_registers_itself() -> Result<(), InjectError> {
    let clock = value("clock", "tick").ad_hoc();
    let container = Container::new("container");

    assert!(!container.has_registrations(&clock));
    assert_eq!(container.inject(&clock)?, "tick");
    assert!(container.has_registrations(&clock));
    Ok(())
}

#[test]
fn purge_drops_cached_instances() -> Result<(), InjectError> {
    let created = Counter::default();
    let service = counted_service("service", &created);
    let container = Container::new("container");
    container.register(&service)?;

    let first = container.inject(&service)?;
    container.purge(&service);
    let second = container.inject(&service)?;

    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(created.count(), 2);
    Ok(())
}

#[test]
fn concurrent_injections_share_one_singleton() -> Result<(), InjectError> {
    let created = Counter::default();
    let service = counted_service("service", &created);
    let container = Container::new("container");
    container.register(&service)?;

    let instances = thread::scope(|scope| {
        let handles = (0..8)
            .map(|_| scope.spawn(|| container.inject(&service)))
            .collect::<Vec<_>>();
        handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .collect::<Result<Vec<_>, _>>()
    })?;

    assert!(instances
        .iter()
        .all(|instance| Arc::ptr_eq(instance, &instances[0])));
    assert_eq!(container.get_instances(&service)?.len(), 1);
    Ok(())
}
