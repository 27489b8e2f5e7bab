use std::{convert::Infallible, sync::Arc};

use super::{value, Counter, Log};
use crate::{
    deregistration_callback, registration_callback, Bunch, Container, ContainerConfig,
    InjectError, Injectable,
};

#[test]
fn registering_twice_fails() -> Result<(), InjectError> {
    let target = value("target", "v");
    let container = Container::new("container");
    container.register(&target)?;

    let error = container.register(&target).unwrap_err();

    assert!(matches!(
        error,
        InjectError::DuplicateRegistration {
            same_injectable: true,
            ..
        }
    ));
    assert_eq!(
        error.to_string(),
        r#"Tried to register same injectable multiple times: "target" (registering "container" -> "target")"#
    );
    Ok(())
}

#[test]
fn registering_same_id_twice_fails() -> Result<(), InjectError> {
    let container = Container::new("container");
    container.register(&value("target", "v"))?;

    let error = container.register(&value("target", "w")).unwrap_err();

    assert_eq!(
        error.to_string(),
        r#"Tried to register multiple injectables for ID "target" (registering "container" -> "target")"#
    );
    Ok(())
}

#[test]
fn failing_batch_registers_nothing() -> Result<(), InjectError> {
    let existing = value("existing", "v");
    let fresh = value("fresh", "w");
    let container = Container::new("container");
    container.register(&existing)?;

    assert!(container.register_all(&[&fresh, &existing]).is_err());

    assert!(!container.has_registrations(&fresh));
    Ok(())
}

#[test]
fn deregistered_injectable_can_be_registered_again() -> Result<(), InjectError> {
    let created = Counter::default();
    let service = Injectable::singleton("service", {
        let created = created.clone();
        move |_| Ok::<_, Infallible>(Arc::new(created.hit()))
    });
    let container = Container::new("container");
    container.register(&service)?;
    assert_eq!(*container.inject(&service)?, 1);

    container.deregister(&service)?;
    assert!(matches!(
        container.inject(&service),
        Err(InjectError::NotRegistered { .. })
    ));
    assert!(matches!(
        container.deregister(&service),
        Err(InjectError::NotRegistered { .. })
    ));

    container.register(&service)?;
    assert_eq!(*container.inject(&service)?, 2);
    Ok(())
}

/// Parent registering and injecting `child` during its own instantiation
fn parent_of(child: &Injectable<String>) -> Injectable<String> {
    let child = child.clone();
    Injectable::singleton("parent", move |di| {
        di.register(&child)?;
        Ok::<_, InjectError>(format!("parent of {}", di.inject(&child)?))
    })
}

#[test]
fn nested_registrations_are_namespaced() -> Result<(), InjectError> {
    let child = value("child", "c");
    let parent = parent_of(&child);
    let container = Container::new("container");
    container.register(&parent)?;

    assert_eq!(container.inject(&parent)?, "parent of c");
    assert_eq!(container.inject_with_meta(&child, ())?.meta.id, "parent:child");
    Ok(())
}

#[test]
fn nested_duplicate_names_the_registering_chain() -> Result<(), InjectError> {
    let child = value("child", "c");
    let parent = Injectable::singleton("parent", {
        let child = child.clone();
        move |di| {
            di.register(&child)?;
            di.register(&child)?;
            Ok::<_, InjectError>("unreachable".to_string())
        }
    });
    let container = Container::new("container");
    container.register(&parent)?;

    let error = container.inject(&parent).unwrap_err();

    assert_eq!(
        error.to_string(),
        r#"Tried to register same injectable multiple times: "parent:child" (registering "container" -> "parent" -> "parent:child")"#
    );
    Ok(())
}

#[test]
fn deregistration_cascades_to_nested_registrations() -> Result<(), InjectError> {
    let child = value("child", "c");
    let parent = parent_of(&child);
    let container = Container::new("container");
    container.register(&parent)?;
    container.inject(&parent)?;
    assert!(container.has_registrations(&child));

    container.deregister(&parent)?;

    assert!(!container.has_registrations(&parent));
    assert!(!container.has_registrations(&child));
    Ok(())
}

#[test]
fn callbacks_observe_registrations() -> Result<(), InjectError> {
    let log = Log::default();
    let on_register = registration_callback("on-register", {
        let log = log.clone();
        move |def| log.push(format!("+{}", def.id()))
    });
    let on_deregister = deregistration_callback("on-deregister", {
        let log = log.clone();
        move |def| log.push(format!("-{}", def.id()))
    });
    let first = value("first", "a");
    let second = value("second", "b");
    let container = Container::new("container");

    container.register_all(&[&on_register, &on_deregister])?;
    container.register_all(&[&first, &second])?;
    container.deregister(&first)?;

    assert_eq!(
        log.entries(),
        ["+on-register", "+on-deregister", "+first", "+second", "-first"]
    );
    Ok(())
}

#[test]
fn bunch_registers_and_deregisters_together() -> Result<(), InjectError> {
    let first = value("first", "a");
    let second = value("second", "b");
    let bunch = Bunch::new().with("first", &first).with("second", &second);
    let container = Container::new("container");

    container.register(&bunch)?;
    assert_eq!(bunch.names().collect::<Vec<_>>(), ["first", "second"]);
    assert_eq!(bunch.get("second").map(|def| def.id()), Some("second"));
    assert_eq!(container.inject(&second)?, "b");

    container.deregister(&bunch)?;
    assert!(!container.has_registrations(&first));
    assert!(!container.has_registrations(&second));
    Ok(())
}

#[test]
fn builder_registers_everything_on_build() -> Result<(), InjectError> {
    let first = value("first", "a");
    let second = value("second", "b");

    let container = Container::builder("app")
        .register(&first)
        .register(&second)
        .build()?;

    assert_eq!(container.config(), &ContainerConfig::new("app"));
    assert_eq!(container.inject(&second)?, "b");
    Ok(())
}

#[test]
fn builder_fails_on_duplicates() {
    let first = value("first", "a");

    let result = Container::builder("app")
        .register(&first)
        .register(&first)
        .build();

    assert!(matches!(
        result,
        Err(InjectError::DuplicateRegistration { .. })
    ));
}
