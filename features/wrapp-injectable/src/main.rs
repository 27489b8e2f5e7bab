use std::{convert::Infallible, error::Error, sync::Arc};

use wrapp_injectable::{
    error_monitor, Container, InjectError, Injectable, InjectionToken, InstantiationDecorator,
};

#[derive(Debug)]
struct Config {
    greeting: String,
}

#[derive(Debug)]
struct Greeter {
    config: Arc<Config>,
    name: String,
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Injectable::singleton("config", |_| {
        Ok::<_, Infallible>(Arc::new(Config {
            greeting: "Hello".to_string(),
        }))
    });

    let greeters = InjectionToken::<Arc<Greeter>>::new("greeter");
    let greeter = |name: &'static str| {
        let config = config.clone();
        Injectable::singleton(name, move |di| {
            Ok::<_, InjectError>(Arc::new(Greeter {
                config: di.inject(&config)?,
                name: name.to_string(),
            }))
        })
        .implements(&greeters)
    };

    let async_value = Injectable::singleton_async("async-value", |_| async {
        Ok::<_, Infallible>(42_u64)
    });

    let container = Container::builder("demo")
        .with_error_monitoring()
        .register(&config)
        .register(&greeter("world"))
        .register(&greeter("rust"))
        .register(&async_value)
        .register(&error_monitor("stderr-monitor", |report| {
            eprintln!("instantiation failed: {}", report.error);
        }))
        .build()?;

    container.decorate(
        &config,
        InstantiationDecorator::map_instance(|config: Arc<Config>| {
            Arc::new(Config {
                greeting: format!("{}!", config.greeting),
            })
        }),
    )?;

    for greeter in container.inject_many(&greeters)? {
        println!("{} {}", greeter.config.greeting, greeter.name);
    }

    let value = futures::executor::block_on(container.inject(&async_value)?)
        .map_err(|error| error.to_string())?;
    println!("async value: {value}");
    println!("{container:?}");
    Ok(())
}
