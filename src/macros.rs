//! The [`messages!`](crate::messages) macro: declarative handler tables
//! for actor types.

/// Declares the message handlers of an actor type.
///
/// The macro takes the actor type, a module name, and the signatures of the
/// handler methods already defined on the type, and generates inside the
/// module:
///
/// - one zero-size tag type per handler, implementing
///   [`Handler`](crate::Handler) with a stable
///   [`MessageId`](crate::MessageId) derived from the actor-qualified
///   handler name;
/// - a `Tell` extension trait so `ref.handler(args…)` reads like a direct
///   method call (sugar for `ref.tell(tag, (args…,))`);
/// - for `remote impl` blocks, a `register()` function installing the wire
///   trampolines for every handler (and their packed-batch companions),
///   to be called before the cluster is started.
///
/// Three handler shapes are supported. Unit and value shapes are plain
/// synchronous methods; the `future` shape declares a method returning
/// `impl Future<Output = lapis::Result<T>> + 'static`, which is passed
/// through to the caller unchanged. The synchronous body of a handler runs
/// while the activation is borrowed; the returned future must not capture
/// the activation, which is what makes interleaving reentrant handlers
/// sound.
///
/// # Examples
///
/// ```rust,no_run
/// # fn main() {}
/// use lapis::{messages, Actor};
///
/// struct Counter {
///     count: u64,
/// }
///
/// impl Actor for Counter {
///     type Key = u64;
///
///     fn activate(_key: &u64) -> Self {
///         Self { count: 0 }
///     }
/// }
///
/// impl Counter {
///     fn inc(&mut self) {
///         self.count += 1;
///     }
///
///     fn count(&self) -> u64 {
///         self.count
///     }
/// }
///
/// messages! {
///     impl Counter as pub mod counter {
///         fn inc(&mut self);
///         fn count(&self) -> u64;
///     }
/// }
///
/// # async fn run() -> lapis::Result<()> {
/// use counter::Tell as _;
///
/// let counter = lapis::get::<Counter>(0);
/// counter.inc().await?;
/// assert_eq!(counter.count().await?, 1);
/// # Ok(())
/// # }
/// ```
#[macro_export]
macro_rules! messages {
    (remote impl $actor:ident as $vis:vis mod $modname:ident { $($body:tt)* }) => {
        $vis mod $modname {
            #![allow(non_camel_case_types)]

            use super::*;

            $crate::__lapis_tags!([remote] $actor; $($body)*);

            /// Typed dispatch sugar for references to this actor: each
            /// handler becomes a method on the reference.
            pub trait Tell {
                $crate::__lapis_tell_decls!($actor; $($body)*);
            }

            impl Tell for $crate::ActorRef<$actor> {
                $crate::__lapis_tell_impls!($actor; $($body)*);
            }

            $crate::__lapis_register!([remote] $actor; $($body)*);
        }
    };
    (impl $actor:ident as $vis:vis mod $modname:ident { $($body:tt)* }) => {
        $vis mod $modname {
            #![allow(non_camel_case_types)]

            use super::*;

            $crate::__lapis_tags!([local] $actor; $($body)*);

            /// Typed dispatch sugar for references to this actor: each
            /// handler becomes a method on the reference.
            pub trait Tell {
                $crate::__lapis_tell_decls!($actor; $($body)*);
            }

            impl Tell for $crate::ActorRef<$actor> {
                $crate::__lapis_tell_impls!($actor; $($body)*);
            }
        }
    };
}

/// Generates the tag types and their `Handler` impls.
#[doc(hidden)]
#[macro_export]
macro_rules! __lapis_tags {
    ([$kind:ident] $actor:ident;) => {};
    ([$kind:ident] $actor:ident;
     $(#[$meta:meta])* fn $name:ident(&mut self $(, $arg:ident : $ty:ty)* $(,)?) -> future $ret:ty;
     $($rest:tt)*) => {
        $crate::__lapis_one_tag!([$kind] $actor, $(#[$meta])* $name, borrow_mut, ($($arg : $ty),*), $ret, future);
        $crate::__lapis_tags!([$kind] $actor; $($rest)*);
    };
    ([$kind:ident] $actor:ident;
     $(#[$meta:meta])* fn $name:ident(&self $(, $arg:ident : $ty:ty)* $(,)?) -> future $ret:ty;
     $($rest:tt)*) => {
        $crate::__lapis_one_tag!([$kind] $actor, $(#[$meta])* $name, borrow, ($($arg : $ty),*), $ret, future);
        $crate::__lapis_tags!([$kind] $actor; $($rest)*);
    };
    ([$kind:ident] $actor:ident;
     $(#[$meta:meta])* fn $name:ident(&mut self $(, $arg:ident : $ty:ty)* $(,)?) -> $ret:ty;
     $($rest:tt)*) => {
        $crate::__lapis_one_tag!([$kind] $actor, $(#[$meta])* $name, borrow_mut, ($($arg : $ty),*), $ret, value);
        $crate::__lapis_tags!([$kind] $actor; $($rest)*);
    };
    ([$kind:ident] $actor:ident;
     $(#[$meta:meta])* fn $name:ident(&self $(, $arg:ident : $ty:ty)* $(,)?) -> $ret:ty;
     $($rest:tt)*) => {
        $crate::__lapis_one_tag!([$kind] $actor, $(#[$meta])* $name, borrow, ($($arg : $ty),*), $ret, value);
        $crate::__lapis_tags!([$kind] $actor; $($rest)*);
    };
    ([$kind:ident] $actor:ident;
     $(#[$meta:meta])* fn $name:ident(&mut self $(, $arg:ident : $ty:ty)* $(,)?);
     $($rest:tt)*) => {
        $crate::__lapis_one_tag!([$kind] $actor, $(#[$meta])* $name, borrow_mut, ($($arg : $ty),*), (), unit);
        $crate::__lapis_tags!([$kind] $actor; $($rest)*);
    };
    ([$kind:ident] $actor:ident;
     $(#[$meta:meta])* fn $name:ident(&self $(, $arg:ident : $ty:ty)* $(,)?);
     $($rest:tt)*) => {
        $crate::__lapis_one_tag!([$kind] $actor, $(#[$meta])* $name, borrow, ($($arg : $ty),*), (), unit);
        $crate::__lapis_tags!([$kind] $actor; $($rest)*);
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __lapis_one_tag {
    ([$kind:ident] $actor:ident, $(#[$meta:meta])* $name:ident, $borrow:ident, ($($arg:ident : $ty:ty),*), $ret:ty, future) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug)]
        pub struct $name;

        impl $crate::Handler<$actor> for $name {
            type Args = ($($ty,)*);
            type Output = $ret;
            type Fut = $crate::futures::future::LocalBoxFuture<'static, $crate::Result<$ret>>;

            const ID: $crate::MessageId =
                $crate::MessageId::of(concat!(stringify!($actor), "::", stringify!($name)));
            const NAME: &'static str = concat!(stringify!($actor), "::", stringify!($name));

            fn invoke(
                state: &::std::rc::Rc<::std::cell::RefCell<$actor>>,
                args: Self::Args,
            ) -> Self::Fut {
                let ($($arg,)*) = args;
                let fut = state.$borrow().$name($($arg),*);
                ::std::boxed::Box::pin(fut)
            }

            $crate::__lapis_remote_fns!([$kind] $actor);
        }
    };
    ([$kind:ident] $actor:ident, $(#[$meta:meta])* $name:ident, $borrow:ident, ($($arg:ident : $ty:ty),*), $ret:ty, value) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug)]
        pub struct $name;

        impl $crate::Handler<$actor> for $name {
            type Args = ($($ty,)*);
            type Output = $ret;
            type Fut = ::std::future::Ready<$crate::Result<$ret>>;

            const ID: $crate::MessageId =
                $crate::MessageId::of(concat!(stringify!($actor), "::", stringify!($name)));
            const NAME: &'static str = concat!(stringify!($actor), "::", stringify!($name));

            fn invoke(
                state: &::std::rc::Rc<::std::cell::RefCell<$actor>>,
                args: Self::Args,
            ) -> Self::Fut {
                let ($($arg,)*) = args;
                let out = state.$borrow().$name($($arg),*);
                ::std::future::ready(::std::result::Result::Ok(out))
            }

            $crate::__lapis_remote_fns!([$kind] $actor);
        }
    };
    ([$kind:ident] $actor:ident, $(#[$meta:meta])* $name:ident, $borrow:ident, ($($arg:ident : $ty:ty),*), $ret:ty, unit) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug)]
        pub struct $name;

        impl $crate::Handler<$actor> for $name {
            type Args = ($($ty,)*);
            type Output = ();
            type Fut = ::std::future::Ready<$crate::Result<()>>;

            const ID: $crate::MessageId =
                $crate::MessageId::of(concat!(stringify!($actor), "::", stringify!($name)));
            const NAME: &'static str = concat!(stringify!($actor), "::", stringify!($name));

            fn invoke(
                state: &::std::rc::Rc<::std::cell::RefCell<$actor>>,
                args: Self::Args,
            ) -> Self::Fut {
                let ($($arg,)*) = args;
                state.$borrow().$name($($arg),*);
                ::std::future::ready(::std::result::Result::Ok(()))
            }

            $crate::__lapis_remote_fns!([$kind] $actor);
        }
    };
}

/// Wire-capable handlers override the default (local-only) remote dispatch
/// of the `Handler` trait. Expands to nothing for plain `impl` blocks, and
/// to nothing at all when lapis is built without the `cluster` feature.
#[cfg(feature = "cluster")]
#[doc(hidden)]
#[macro_export]
macro_rules! __lapis_remote_fns {
    ([local] $actor:ident) => {};
    ([remote] $actor:ident) => {
        fn remote(
            node: $crate::cluster::NodeDesc,
            key: &<$actor as $crate::Actor>::Key,
            args: Self::Args,
        ) -> $crate::futures::future::LocalBoxFuture<'static, $crate::Result<Self::Output>> {
            $crate::cluster::remote_call::<$actor, Self>(node, key, args)
        }

        fn remote_packed(
            node: $crate::cluster::NodeDesc,
            key: &<$actor as $crate::Actor>::Key,
            batch: ::std::vec::Vec<Self::Args>,
        ) -> $crate::futures::future::LocalBoxFuture<'static, $crate::Result<::std::vec::Vec<Self::Output>>>
        {
            $crate::cluster::remote_call_packed::<$actor, Self>(node, key, batch)
        }
    };
}

#[cfg(not(feature = "cluster"))]
#[doc(hidden)]
#[macro_export]
macro_rules! __lapis_remote_fns {
    ($($tt:tt)*) => {};
}

/// Generates the `Tell` trait method declarations.
#[doc(hidden)]
#[macro_export]
macro_rules! __lapis_tell_decls {
    ($actor:ident;) => {};
    ($actor:ident;
     $(#[$meta:meta])* fn $name:ident(&mut self $(, $arg:ident : $ty:ty)* $(,)?) -> future $ret:ty;
     $($rest:tt)*) => {
        $crate::__lapis_one_decl!($name, ($($arg : $ty),*), $ret);
        $crate::__lapis_tell_decls!($actor; $($rest)*);
    };
    ($actor:ident;
     $(#[$meta:meta])* fn $name:ident(&self $(, $arg:ident : $ty:ty)* $(,)?) -> future $ret:ty;
     $($rest:tt)*) => {
        $crate::__lapis_one_decl!($name, ($($arg : $ty),*), $ret);
        $crate::__lapis_tell_decls!($actor; $($rest)*);
    };
    ($actor:ident;
     $(#[$meta:meta])* fn $name:ident(&mut self $(, $arg:ident : $ty:ty)* $(,)?) -> $ret:ty;
     $($rest:tt)*) => {
        $crate::__lapis_one_decl!($name, ($($arg : $ty),*), $ret);
        $crate::__lapis_tell_decls!($actor; $($rest)*);
    };
    ($actor:ident;
     $(#[$meta:meta])* fn $name:ident(&self $(, $arg:ident : $ty:ty)* $(,)?) -> $ret:ty;
     $($rest:tt)*) => {
        $crate::__lapis_one_decl!($name, ($($arg : $ty),*), $ret);
        $crate::__lapis_tell_decls!($actor; $($rest)*);
    };
    ($actor:ident;
     $(#[$meta:meta])* fn $name:ident(&mut self $(, $arg:ident : $ty:ty)* $(,)?);
     $($rest:tt)*) => {
        $crate::__lapis_one_decl!($name, ($($arg : $ty),*), ());
        $crate::__lapis_tell_decls!($actor; $($rest)*);
    };
    ($actor:ident;
     $(#[$meta:meta])* fn $name:ident(&self $(, $arg:ident : $ty:ty)* $(,)?);
     $($rest:tt)*) => {
        $crate::__lapis_one_decl!($name, ($($arg : $ty),*), ());
        $crate::__lapis_tell_decls!($actor; $($rest)*);
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __lapis_one_decl {
    ($name:ident, ($($arg:ident : $ty:ty),*), $ret:ty) => {
        fn $name(
            &self
            $(, $arg: $ty)*
        ) -> impl ::std::future::Future<Output = $crate::Result<$ret>> + 'static;
    };
}

/// Generates the `Tell` trait method bodies.
#[doc(hidden)]
#[macro_export]
macro_rules! __lapis_tell_impls {
    ($actor:ident;) => {};
    ($actor:ident;
     $(#[$meta:meta])* fn $name:ident(&mut self $(, $arg:ident : $ty:ty)* $(,)?) -> future $ret:ty;
     $($rest:tt)*) => {
        $crate::__lapis_one_impl!($name, ($($arg : $ty),*), $ret);
        $crate::__lapis_tell_impls!($actor; $($rest)*);
    };
    ($actor:ident;
     $(#[$meta:meta])* fn $name:ident(&self $(, $arg:ident : $ty:ty)* $(,)?) -> future $ret:ty;
     $($rest:tt)*) => {
        $crate::__lapis_one_impl!($name, ($($arg : $ty),*), $ret);
        $crate::__lapis_tell_impls!($actor; $($rest)*);
    };
    ($actor:ident;
     $(#[$meta:meta])* fn $name:ident(&mut self $(, $arg:ident : $ty:ty)* $(,)?) -> $ret:ty;
     $($rest:tt)*) => {
        $crate::__lapis_one_impl!($name, ($($arg : $ty),*), $ret);
        $crate::__lapis_tell_impls!($actor; $($rest)*);
    };
    ($actor:ident;
     $(#[$meta:meta])* fn $name:ident(&self $(, $arg:ident : $ty:ty)* $(,)?) -> $ret:ty;
     $($rest:tt)*) => {
        $crate::__lapis_one_impl!($name, ($($arg : $ty),*), $ret);
        $crate::__lapis_tell_impls!($actor; $($rest)*);
    };
    ($actor:ident;
     $(#[$meta:meta])* fn $name:ident(&mut self $(, $arg:ident : $ty:ty)* $(,)?);
     $($rest:tt)*) => {
        $crate::__lapis_one_impl!($name, ($($arg : $ty),*), ());
        $crate::__lapis_tell_impls!($actor; $($rest)*);
    };
    ($actor:ident;
     $(#[$meta:meta])* fn $name:ident(&self $(, $arg:ident : $ty:ty)* $(,)?);
     $($rest:tt)*) => {
        $crate::__lapis_one_impl!($name, ($($arg : $ty),*), ());
        $crate::__lapis_tell_impls!($actor; $($rest)*);
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __lapis_one_impl {
    ($name:ident, ($($arg:ident : $ty:ty),*), $ret:ty) => {
        fn $name(
            &self
            $(, $arg: $ty)*
        ) -> impl ::std::future::Future<Output = $crate::Result<$ret>> + 'static {
            self.tell($name, ($($arg,)*))
        }
    };
}

/// Generates the wire trampoline registration for `remote impl` blocks.
#[cfg(feature = "cluster")]
#[doc(hidden)]
#[macro_export]
macro_rules! __lapis_register {
    ([local] $actor:ident; $($body:tt)*) => {};
    ([remote] $actor:ident; $($body:tt)*) => {
        /// Registers the wire trampolines for every handler of this actor,
        /// including their packed-batch companions.
        ///
        /// Idempotent. Must complete before the cluster is started.
        pub fn register() {
            $crate::__lapis_register_each!($actor; $($body)*);
        }
    };
}

#[cfg(not(feature = "cluster"))]
#[doc(hidden)]
#[macro_export]
macro_rules! __lapis_register {
    ($($tt:tt)*) => {};
}

#[cfg(feature = "cluster")]
#[doc(hidden)]
#[macro_export]
macro_rules! __lapis_register_each {
    ($actor:ident;) => {};
    ($actor:ident;
     $(#[$meta:meta])* fn $name:ident(&mut self $(, $arg:ident : $ty:ty)* $(,)?) -> future $ret:ty;
     $($rest:tt)*) => {
        $crate::cluster::registry::register::<$actor, $name>();
        $crate::__lapis_register_each!($actor; $($rest)*);
    };
    ($actor:ident;
     $(#[$meta:meta])* fn $name:ident(&self $(, $arg:ident : $ty:ty)* $(,)?) -> future $ret:ty;
     $($rest:tt)*) => {
        $crate::cluster::registry::register::<$actor, $name>();
        $crate::__lapis_register_each!($actor; $($rest)*);
    };
    ($actor:ident;
     $(#[$meta:meta])* fn $name:ident(&mut self $(, $arg:ident : $ty:ty)* $(,)?) -> $ret:ty;
     $($rest:tt)*) => {
        $crate::cluster::registry::register::<$actor, $name>();
        $crate::__lapis_register_each!($actor; $($rest)*);
    };
    ($actor:ident;
     $(#[$meta:meta])* fn $name:ident(&self $(, $arg:ident : $ty:ty)* $(,)?) -> $ret:ty;
     $($rest:tt)*) => {
        $crate::cluster::registry::register::<$actor, $name>();
        $crate::__lapis_register_each!($actor; $($rest)*);
    };
    ($actor:ident;
     $(#[$meta:meta])* fn $name:ident(&mut self $(, $arg:ident : $ty:ty)* $(,)?);
     $($rest:tt)*) => {
        $crate::cluster::registry::register::<$actor, $name>();
        $crate::__lapis_register_each!($actor; $($rest)*);
    };
    ($actor:ident;
     $(#[$meta:meta])* fn $name:ident(&self $(, $arg:ident : $ty:ty)* $(,)?);
     $($rest:tt)*) => {
        $crate::cluster::registry::register::<$actor, $name>();
        $crate::__lapis_register_each!($actor; $($rest)*);
    };
}

#[cfg(not(feature = "cluster"))]
#[doc(hidden)]
#[macro_export]
macro_rules! __lapis_register_each {
    ($($tt:tt)*) => {};
}
