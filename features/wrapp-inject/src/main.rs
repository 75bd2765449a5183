use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use wrapp_inject::{
    bind, bind_scope, bind_scope_seed, create_injector, elements, enter_seeded_scope, expose,
    private, Injector, Key, Scope, Seeds,
};

#[derive(Debug)]
struct RequestId(String);

#[derive(Debug)]
struct Handler {
    greeting: Arc<String>,
    request: Arc<RequestId>,
}

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let request = Scope::seeded("request");

    let injector = create_injector(elements![
        bind::<i64>().to_const(420),
        bind::<String>()
            .to_fn(move |x: Arc<i64>| {
                counter.fetch_add(1, Ordering::SeqCst);
                x.to_string()
            })
            .singleton(),
        private(elements![
            bind::<u32>().to_fn(|x: Arc<i64>| *x as u32 + 1).singleton(),
            expose(Key::of::<u32>()),
        ]),
        bind_scope(request.clone()),
        bind_scope_seed(Key::of::<RequestId>(), request.clone()),
        bind::<Handler>()
            .to_fn(|greeting: Arc<String>, request: Arc<RequestId>| Handler { greeting, request })
            .in_scope(request.clone()),
    ])?;

    println!("{:?}", injector);
    println!("{}", injector.get::<String>()?);
    println!("{}", injector.get::<String>()?);
    println!("factory calls: {}", calls.load(Ordering::SeqCst));
    println!("exposed from private block: {}", injector.get::<u32>()?);

    let session = enter_seeded_scope(
        &injector,
        &request,
        Seeds::new().with(RequestId("first".to_string())),
    )?;
    println!("{:?}", injector.get::<Handler>()?);
    session.close();

    let itself = injector.get::<Injector>()?;
    println!("{}", itself.graph()?);
    Ok(())
}
