use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use wrapp_inject::{
    bind, create_injector, elements, expose, map_binder, overrides, private, set_binder,
    InjectError, InjectMap, InjectSet, Key, Tag,
};

#[test]
fn overrides_replace_the_original_binding() {
    let original = elements![
        bind::<u32>().to_const(1),
        bind::<String>().to_fn(|n: Arc<u32>| n.to_string()),
    ];
    let injector =
        create_injector(overrides(elements![bind::<u32>().to_const(2)], original)).unwrap();

    assert_eq!(*injector.get::<u32>().unwrap(), 2);
    assert_eq!(*injector.get::<String>().unwrap(), "2");
}

#[test]
fn overrides_replace_multibindings_wholesale() {
    let plugins = set_binder::<&'static str>();
    let original = elements![
        bind::<&'static str>().tag("a").to_const("a"),
        bind::<&'static str>().tag("b").to_const("b"),
        plugins.bind(Key::tagged::<&'static str>("a")),
        plugins.bind(Key::tagged::<&'static str>("b")),
    ];
    let injector = create_injector(overrides(
        elements![plugins.bind(Key::tagged::<&'static str>("b"))],
        original,
    ))
    .unwrap();

    let set = injector.get_set::<&'static str>().unwrap();
    assert_eq!(set.len(), 1);
    assert!(set.contains(&"b"));
}

#[test]
fn private_keys_need_an_expose() {
    let injector = create_injector(elements![private(elements![
        bind::<u8>().to_const(1),
        bind::<u16>().to_fn(|n: Arc<u8>| *n as u16 + 1).expose(),
    ])])
    .unwrap();

    assert_eq!(*injector.get::<u16>().unwrap(), 2);
    assert!(matches!(
        injector.get::<u8>(),
        Err(InjectError::UnboundKey(key)) if key == Key::of::<u8>()
    ));
}

#[derive(Debug)]
struct Pool {
    id: usize,
}

#[test]
fn exposed_keys_share_one_child_injector() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counted = calls.clone();
    let injector = create_injector(elements![private(elements![
        bind::<Pool>()
            .to_fn(move || Pool {
                id: counted.fetch_add(1, Ordering::SeqCst),
            })
            .singleton(),
        bind::<String>().to_fn(|pool: Arc<Pool>| format!("pool-{}", pool.id)),
        bind::<u64>().to_fn(|pool: Arc<Pool>| pool.id as u64),
        expose(Key::of::<String>()),
        expose(Key::of::<u64>()),
    ])])
    .unwrap();

    assert_eq!(*injector.get::<String>().unwrap(), "pool-0");
    assert_eq!(*injector.get::<u64>().unwrap(), 0);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn private_blocks_see_the_enclosing_bindings() {
    let injector = create_injector(elements![
        bind::<u32>().to_const(41),
        private(elements![bind::<u64>()
            .to_fn(|n: Arc<u32>| *n as u64 + 1)
            .expose()]),
    ])
    .unwrap();
    assert_eq!(*injector.get::<u64>().unwrap(), 42);
}

#[test]
fn private_child_fails_once_its_parent_is_gone() {
    let injector = create_injector(elements![
        bind::<u32>().to_const(1),
        private(elements![bind::<u64>()
            .to_fn(|n: Arc<u32>| *n as u64)
            .expose()]),
    ])
    .unwrap();

    let child = injector
        .get_key::<wrapp_inject::PrivateInjector>(
            &injector
                .collection()
                .bindings()
                .map(|binding| binding.key().clone())
                .find(|key| key.ty == Key::of::<wrapp_inject::PrivateInjector>().ty)
                .unwrap(),
        )
        .unwrap();
    let child = child.injector().clone();
    drop(injector);

    assert!(matches!(
        child.get::<u32>(),
        Err(InjectError::ParentDropped)
    ));
}

#[test]
fn sets_collect_every_member() {
    let plugins = set_binder::<String>();
    let injector = create_injector(elements![
        bind::<String>().tag("a").to_const("alpha".to_string()),
        bind::<String>().tag("b").to_const("beta".to_string()),
        plugins.bind(Key::tagged::<String>("a")),
        plugins.bind(Key::tagged::<String>("b")),
        bind::<usize>().to_fn(|all: InjectSet<String>| all.len()),
    ])
    .unwrap();

    let set = injector.get_set::<String>().unwrap();
    assert!(set.contains(&"alpha".to_string()));
    assert!(set.contains(&"beta".to_string()));
    assert_eq!(*injector.get::<usize>().unwrap(), 2);
}

#[test]
fn declared_set_may_be_empty() {
    let injector = create_injector(elements![set_binder::<u32>().declare()]).unwrap();
    assert!(injector.get_set::<u32>().unwrap().is_empty());
}

#[test]
fn undeclared_set_is_unbound() {
    let injector = create_injector(elements![]).unwrap();
    assert!(matches!(
        injector.get_set::<u32>(),
        Err(InjectError::UnboundKey(key)) if key == Key::set_of::<u32>()
    ));
}

#[test]
fn maps_collect_entries_by_map_key() {
    let handlers = map_binder::<u32>();
    let injector = create_injector(elements![
        bind::<u32>().tag("one").to_const(1),
        bind::<u32>().tag("two").to_const(2),
        handlers.bind("first", Key::tagged::<u32>("one")),
        handlers.bind(2_i64, Key::tagged::<u32>("two")),
        bind::<u32>().to_fn(|all: InjectMap<u32>| all.iter().map(|(_, v)| **v).sum::<u32>()),
    ])
    .unwrap();

    let map = injector.get_map::<u32>().unwrap();
    assert_eq!(map.len(), 2);
    assert_eq!(**map.get(&Tag::from("first")).unwrap(), 1);
    assert_eq!(**map.get(&Tag::Id(2)).unwrap(), 2);
    assert_eq!(*injector.get::<u32>().unwrap(), 3);
}

#[test]
fn unbound_set_member_fails_resolution() {
    let plugins = set_binder::<u32>();
    let injector = create_injector(elements![plugins.bind(Key::tagged::<u32>("gone"))]).unwrap();
    assert!(matches!(
        injector.get_set::<u32>(),
        Err(InjectError::UnboundKey(key)) if key == Key::tagged::<u32>("gone")
    ));
}

#[test]
fn graph_check_reports_problems_before_resolution() {
    let injector = create_injector(elements![
        bind::<u8>().to_fn(|v: Arc<u16>| *v as u8),
        bind::<u16>().to_fn(|v: Arc<u8>| *v as u16),
        bind::<String>().to_fn(|v: Arc<u32>| v.to_string()),
    ])
    .unwrap();
    let errors = injector.graph().unwrap().check().unwrap_err();
    assert_eq!(errors.errors.len(), 2);

    let child = wrapp_inject::create_child_injector(
        elements![bind::<u64>().to_fn(|v: Arc<u8>| *v as u64)],
        &injector,
    )
    .unwrap();
    assert!(child.graph().unwrap().check().is_ok());
}
