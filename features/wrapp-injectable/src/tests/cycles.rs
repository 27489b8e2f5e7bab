use std::{
    convert::Infallible,
    sync::{Arc, OnceLock},
};

use super::Counter;
use crate::{Container, DiHandle, InjectError, Injectable};

type Slot = Arc<OnceLock<Injectable<String>>>;

/// Singleton wrapping whatever the injectable in `next` provides
fn wrapping(id: &'static str, next: &Slot) -> Injectable<String> {
    let next = next.clone();
    Injectable::singleton(id, move |di| {
        let next = next.get().expect("dependency is set");
        Ok::<_, InjectError>(format!("{id}({})", di.inject(next)?))
    })
}

fn two_cycle() -> (Injectable<String>, Injectable<String>) {
    let slot = Slot::default();
    let a = wrapping("a", &slot);
    let b = Injectable::singleton("b", {
        let a = a.clone();
        move |di| Ok::<_, InjectError>(format!("b({})", di.inject(&a)?))
    });
    slot.set(b.clone()).expect("slot is empty");
    (a, b)
}

fn cycle_of(result: Result<String, InjectError>) -> Vec<String> {
    match result {
        Err(InjectError::CycleDetected { cycle }) => cycle.ids().to_vec(),
        other => panic!("expected a cycle, got {other:?}"),
    }
}

#[test]
fn mutual_dependency_is_rejected() -> Result<(), InjectError> {
    let (a, b) = two_cycle();
    let container = Container::new("container");
    container.register_all(&[&a, &b])?;

    let result = container.inject(&a);

    assert_eq!(cycle_of(result), ["a", "b", "a"]);
    Ok(())
}

#[test]
fn cycle_error_names_the_chain() -> Result<(), InjectError> {
    let (a, b) = two_cycle();
    let container = Container::new("container");
    container.register_all(&[&a, &b])?;

    let error = container.inject(&b).unwrap_err();

    assert_eq!(
        error.to_string(),
        r#"Cycle of injectables encountered: "b" -> "a" -> "b""#
    );
    Ok(())
}

#[test]
fn in_flight_instantiation_is_caught_without_graph_checks() -> Result<(), InjectError> {
    let (a, b) = two_cycle();
    let container = Container::builder("container")
        .detect_cycles(false)
        .register(&a)
        .register(&b)
        .build()?;

    let result = container.inject(&a);

    assert_eq!(cycle_of(result), ["a", "b", "a"]);
    Ok(())
}

#[test]
fn self_dependency_is_rejected() -> Result<(), InjectError> {
    let slot = Slot::default();
    let narcissus = wrapping("narcissus", &slot);
    slot.set(narcissus.clone()).expect("slot is empty");
    let container = Container::new("container");
    container.register(&narcissus)?;

    let result = container.inject(&narcissus);

    assert_eq!(cycle_of(result), ["narcissus", "narcissus"]);
    Ok(())
}

/// Keeps a handle to inject lazily, after its own instantiation
#[derive(Clone)]
struct Deferred {
    di: DiHandle,
}

fn deferred_pair(exempt: bool) -> (Injectable<String>, Injectable<Arc<Deferred>>) {
    let deferred = Injectable::singleton("deferred", |di| {
        Ok::<_, Infallible>(Arc::new(Deferred { di: di.clone() }))
    });
    let owner = Injectable::singleton("owner", {
        let deferred = deferred.clone();
        move |di| {
            di.inject(&deferred)?;
            Ok::<_, InjectError>("owner".to_string())
        }
    });
    let owner = if exempt {
        owner.cannot_cause_cycles()
    } else {
        owner
    };
    (owner, deferred)
}

#[test]
fn deferred_resolution_of_exempt_injectable_succeeds() -> Result<(), InjectError> {
    let (owner, deferred) = deferred_pair(true);
    let container = Container::new("container");
    container.register_all(&[&owner, &deferred])?;

    assert_eq!(container.inject(&owner)?, "owner");
    let handle = container.inject(&deferred)?;

    assert_eq!(handle.di.inject(&owner)?, "owner");
    Ok(())
}

#[test]
fn deferred_resolution_closing_a_loop_is_rejected() -> Result<(), InjectError> {
    let (owner, deferred) = deferred_pair(false);
    let container = Container::new("container");
    container.register_all(&[&owner, &deferred])?;

    container.inject(&owner)?;
    let handle = container.inject(&deferred)?;

    assert_eq!(cycle_of(handle.di.inject(&owner)), ["owner", "deferred", "owner"]);
    Ok(())
}

#[test]
fn failed_instantiation_can_be_retried() -> Result<(), InjectError> {
    let attempts = Counter::default();
    let flaky = Injectable::singleton("flaky", {
        let attempts = attempts.clone();
        move |_| match attempts.hit() {
            1 => Err("not yet"),
            _ => Ok("ready".to_string()),
        }
    });
    let container = Container::new("container");
    container.register(&flaky)?;

    assert!(matches!(
        container.inject(&flaky),
        Err(InjectError::InstantiationFailed { .. })
    ));
    assert_eq!(container.inject(&flaky)?, "ready");
    Ok(())
}
