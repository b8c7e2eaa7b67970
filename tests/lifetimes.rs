mod common;

use common::for_each_backend;
use servitor::{Declarations, InstantiateErrorKind, Injector, ResolveErrorKind, ServiceInfo};
use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Barrier, Mutex,
    },
    thread,
    time::Duration,
};

struct Session(usize);
struct Clock(usize);
struct Request(usize);

fn counted<C, F>(counter: &Arc<AtomicUsize>, make: F) -> impl Fn() -> Result<Arc<C>, InstantiateErrorKind> + Clone
where
    F: Fn(usize) -> C + Clone,
{
    let counter = counter.clone();
    move || Ok(Arc::new(make(counter.fetch_add(1, Ordering::SeqCst))))
}

#[test]
fn test_scope_isolation_and_singleton_sharing() {
    let built = Arc::new(AtomicUsize::new(0));

    for_each_backend(
        || {
            Declarations::new("lifetimes")
                .with(
                    ServiceInfo::builder::<Session>()
                        .factory(counted(&built, Session))
                        .scoped()
                        .build()
                        .unwrap(),
                )
                .with(
                    ServiceInfo::builder::<Clock>()
                        .factory(counted(&built, Clock))
                        .singleton()
                        .build()
                        .unwrap(),
                )
                .with(
                    ServiceInfo::builder::<Request>()
                        .factory(counted(&built, Request))
                        .build()
                        .unwrap(),
                )
        },
        |root| {
            let first = root.create_scope().unwrap();
            let second = root.create_scope().unwrap();

            let session = first.resolve::<Session>().unwrap();
            assert!(Arc::ptr_eq(&session, &first.resolve::<Session>().unwrap()));
            assert!(!Arc::ptr_eq(&session, &second.resolve::<Session>().unwrap()));

            let clock = first.resolve::<Clock>().unwrap();
            assert!(Arc::ptr_eq(&clock, &second.resolve::<Clock>().unwrap()));
            assert!(Arc::ptr_eq(&clock, &root.resolve::<Clock>().unwrap()));

            assert!(!Arc::ptr_eq(
                &first.resolve::<Request>().unwrap(),
                &first.resolve::<Request>().unwrap()
            ));
        },
    );
}

#[test]
fn test_dispose_finalizes_in_reverse_order_once() {
    let finalized = Arc::new(Mutex::new(Vec::new()));

    for_each_backend(
        || {
            let finalizer = |name: &'static str| {
                let finalized = finalized.clone();
                move |_: Arc<Session>| finalized.lock().unwrap().push(name)
            };
            Declarations::new("teardown")
                .with(
                    ServiceInfo::builder::<Session>()
                        .factory(|| Ok::<_, InstantiateErrorKind>(Arc::new(Session(0))))
                        .scoped()
                        .allow_multiple()
                        .finalizer(finalizer("first"))
                        .build()
                        .unwrap(),
                )
                .with(
                    ServiceInfo::builder::<Session>()
                        .factory(|| Ok::<_, InstantiateErrorKind>(Arc::new(Session(1))))
                        .scoped()
                        .allow_multiple()
                        .finalizer(finalizer("second"))
                        .build()
                        .unwrap(),
                )
                .with(
                    ServiceInfo::builder::<Session>()
                        .factory(|| Ok::<_, InstantiateErrorKind>(Arc::new(Session(2))))
                        .scoped()
                        .allow_multiple()
                        .externally_owned()
                        .finalizer(finalizer("external"))
                        .build()
                        .unwrap(),
                )
        },
        |root| {
            finalized.lock().unwrap().clear();
            let scope = root.create_scope().unwrap();

            assert_eq!(scope.resolve_many::<Session>().unwrap().len(), 3);

            scope.dispose();
            scope.dispose();

            assert_eq!(*finalized.lock().unwrap(), ["second", "first"]);
            assert!(!root.is_disposed());
        },
    );
}

#[test]
fn test_transients_never_finalized() {
    let finalized = Arc::new(AtomicUsize::new(0));

    for_each_backend(
        || {
            let finalized = finalized.clone();
            Declarations::new("transient").with(
                ServiceInfo::builder::<Request>()
                    .factory(|| Ok::<_, InstantiateErrorKind>(Arc::new(Request(0))))
                    .finalizer(move |_: Arc<Request>| {
                        finalized.fetch_add(1, Ordering::SeqCst);
                    })
                    .build()
                    .unwrap(),
            )
        },
        |root| {
            let scope = root.create_scope().unwrap();
            scope.resolve::<Request>().unwrap();
            scope.dispose();
        },
    );

    assert_eq!(finalized.load(Ordering::SeqCst), 0);
}

#[test]
fn test_disposed_scope_rejects_resolution() {
    for_each_backend(
        || {
            Declarations::new("disposed").with(
                ServiceInfo::builder::<Clock>()
                    .factory(|| Ok::<_, InstantiateErrorKind>(Arc::new(Clock(0))))
                    .singleton()
                    .build()
                    .unwrap(),
            )
        },
        |root| {
            let scope = root.create_scope().unwrap();
            let handle = scope.handle();
            scope.dispose();

            assert!(matches!(
                scope.resolve::<Clock>(),
                Err(ResolveErrorKind::ObjectDisposed { scope }) if scope == handle
            ));
            assert!(matches!(
                scope.resolve_many::<Clock>(),
                Err(ResolveErrorKind::ObjectDisposed { .. })
            ));
            assert!(root.resolve::<Clock>().is_ok());

            root.dispose();
            assert!(matches!(root.resolve::<Clock>(), Err(ResolveErrorKind::ObjectDisposed { .. })));
        },
    );
}

#[test]
fn test_concurrent_singleton_constructed_once() {
    const THREADS: usize = 8;

    let built = Arc::new(AtomicUsize::new(0));

    for_each_backend(
        || {
            built.store(0, Ordering::SeqCst);
            let built = built.clone();
            Declarations::new("concurrent").with(
                ServiceInfo::builder::<Clock>()
                    .factory(move || {
                        thread::sleep(Duration::from_millis(20));
                        Ok::<_, InstantiateErrorKind>(Arc::new(Clock(built.fetch_add(1, Ordering::SeqCst))))
                    })
                    .singleton()
                    .build()
                    .unwrap(),
            )
        },
        |root| {
            let barrier = Barrier::new(THREADS);
            let clocks: Vec<Arc<Clock>> = thread::scope(|scope| {
                let handles: Vec<_> = (0..THREADS)
                    .map(|_| {
                        let injector = root.create_scope().unwrap();
                        let barrier = &barrier;
                        scope.spawn(move || {
                            barrier.wait();
                            injector.resolve::<Clock>().unwrap()
                        })
                    })
                    .collect();
                handles.into_iter().map(|handle| handle.join().unwrap()).collect()
            });

            assert_eq!(built.load(Ordering::SeqCst), 1);
            assert!(clocks.iter().all(|clock| Arc::ptr_eq(clock, &clocks[0])));
        },
    );
}

#[test]
fn test_concurrent_scoped_constructed_once_per_scope() {
    const THREADS: usize = 8;

    let built = Arc::new(AtomicUsize::new(0));

    for_each_backend(
        || {
            built.store(0, Ordering::SeqCst);
            let built = built.clone();
            Declarations::new("concurrent").with(
                ServiceInfo::builder::<Session>()
                    .factory(move || {
                        thread::sleep(Duration::from_millis(20));
                        Ok::<_, InstantiateErrorKind>(Arc::new(Session(built.fetch_add(1, Ordering::SeqCst))))
                    })
                    .scoped()
                    .build()
                    .unwrap(),
            )
        },
        |root| {
            let scope = root.create_scope().unwrap();
            let barrier = Barrier::new(THREADS);

            let sessions: Vec<Arc<Session>> = thread::scope(|threads| {
                let handles: Vec<_> = (0..THREADS)
                    .map(|_| {
                        let (scope, barrier) = (&scope, &barrier);
                        threads.spawn(move || {
                            barrier.wait();
                            scope.resolve::<Session>().unwrap()
                        })
                    })
                    .collect();
                handles.into_iter().map(|handle| handle.join().unwrap()).collect()
            });

            assert_eq!(built.load(Ordering::SeqCst), 1);
            assert!(sessions.iter().all(|session| Arc::ptr_eq(session, &sessions[0])));

            let other = root.create_scope().unwrap();
            assert!(!Arc::ptr_eq(&other.resolve::<Session>().unwrap(), &sessions[0]));
            assert_eq!(built.load(Ordering::SeqCst), 2);
        },
    );
}

#[test]
fn test_concurrent_wrapping_keeps_one_identity() {
    const THREADS: usize = 8;

    for_each_backend(
        || Declarations::new("wrapping"),
        |root| {
            let scope = root.create_scope().unwrap();
            let root_handle = root.handle();
            drop(root);

            let barrier = Barrier::new(THREADS);
            let wrapped: Vec<(Injector, Arc<Injector>)> = thread::scope(|threads| {
                let handles: Vec<_> = (0..THREADS)
                    .map(|_| {
                        let (scope, barrier) = (&scope, &barrier);
                        threads.spawn(move || {
                            barrier.wait();
                            (scope.parent().unwrap(), scope.resolve::<Injector>().unwrap())
                        })
                    })
                    .collect();
                handles.into_iter().map(|handle| handle.join().unwrap()).collect()
            });

            let (first_parent, _) = &wrapped[0];
            assert_eq!(first_parent.handle(), root_handle);
            for (parent, current) in &wrapped {
                assert!(parent.ptr_eq(first_parent));
                assert!(current.ptr_eq(&scope));
            }
        },
    );
}

#[test]
fn test_wrapper_identity_stable() {
    for_each_backend(
        || {
            Declarations::new("identity").with(
                ServiceInfo::builder::<Session>()
                    .factory(|injector: Injector| Ok::<_, InstantiateErrorKind>(Arc::new(Session(injector.handle().get() as usize))))
                    .scoped()
                    .build()
                    .unwrap(),
            )
        },
        |root| {
            let scope = root.create_scope().unwrap();

            let resolved = scope.resolve::<Injector>().unwrap();
            assert!(resolved.ptr_eq(&scope));
            assert!(scope.parent().unwrap().ptr_eq(&root));
            assert_eq!(scope.resolve::<Session>().unwrap().0 as u64, scope.handle().get());
        },
    );
}
