//! Merging the builtin bundle with the user bundle

use std::sync::Arc;

use tracing::{debug, warn};

use super::{Coordinates, HookDefinition, Hooks, ParallelPredicate, SupportBundle};

/// Merge `user` and `builtin` into the bundle handed to the engine.
///
/// Builtin hooks wrap user hooks: builtin `before*` hooks run first and
/// builtin `after*` hooks run last. Steps keep builtin-then-user order,
/// except that a builtin step whose pattern is identical to a user step is
/// dropped in favour of the user's. Builtin parameter types fill in names the
/// user did not define. The builtin world constructor is used unless the user
/// explicitly provided one. Parallel predicates must both agree. Coordinates
/// are unioned builtin-first. The larger default timeout wins.
pub fn compose(user: SupportBundle, builtin: SupportBundle) -> SupportBundle {
    let hooks = Hooks {
        before_all: outer_first(builtin.hooks.before_all, user.hooks.before_all),
        after_all: outer_last(user.hooks.after_all, builtin.hooks.after_all),
        before: outer_first(builtin.hooks.before, user.hooks.before),
        after: outer_last(user.hooks.after, builtin.hooks.after),
        before_step: outer_first(builtin.hooks.before_step, user.hooks.before_step),
        after_step: outer_last(user.hooks.after_step, builtin.hooks.after_step),
    };

    let mut steps = Vec::with_capacity(builtin.steps.len() + user.steps.len());
    for step in builtin.steps {
        match user.steps.iter().find(|u| u.pattern == step.pattern) {
            Some(shadow) => warn!(
                "Step {} from {} is redefined at {}; using the user definition",
                step.pattern, step.source, shadow.source
            ),
            None => steps.push(step),
        }
    }
    steps.extend(user.steps);

    let mut parameter_types = user.parameter_types;
    for parameter_type in builtin.parameter_types.iter() {
        if !parameter_types.register_if_absent(parameter_type.clone()) {
            debug!("Parameter type {{{}}} is shadowed by the user", parameter_type.name);
        }
    }

    let (world, custom_world_provided) = if user.custom_world_provided {
        (user.world, true)
    } else {
        (builtin.world, false)
    };

    let parallel = both(builtin.parallel, user.parallel);

    let coordinates = Coordinates {
        import_paths: union(builtin.coordinates.import_paths, user.coordinates.import_paths),
        require_paths: union(builtin.coordinates.require_paths, user.coordinates.require_paths),
        loaders: union(builtin.coordinates.loaders, user.coordinates.loaders),
    };

    SupportBundle {
        hooks,
        steps,
        parameter_types,
        world,
        custom_world_provided,
        parallel,
        default_timeout: builtin.default_timeout.max(user.default_timeout),
        coordinates,
    }
}

fn outer_first<F>(
    builtin: Vec<HookDefinition<F>>,
    user: Vec<HookDefinition<F>>,
) -> Vec<HookDefinition<F>> {
    let mut hooks = builtin;
    hooks.extend(user);
    hooks
}

fn outer_last<F>(
    user: Vec<HookDefinition<F>>,
    builtin: Vec<HookDefinition<F>>,
) -> Vec<HookDefinition<F>> {
    let mut hooks = user;
    hooks.extend(builtin);
    hooks
}

fn both(a: Option<ParallelPredicate>, b: Option<ParallelPredicate>) -> Option<ParallelPredicate> {
    match (a, b) {
        (Some(a), Some(b)) => Some(Arc::new(move |info| a(info) && b(info))),
        (a, None) => a,
        (None, b) => b,
    }
}

fn union(first: Vec<String>, second: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(first.len() + second.len());
    for entry in first.into_iter().chain(second) {
        if !out.contains(&entry) {
            out.push(entry);
        }
    }
    out
}
