/// Declaration → state builder
///
/// Building runs an ordered list of named steps, one per state property.
/// Each key holds a list of functions: the built-in step first, then any
/// decorators added with [`StateBuilder::builder`]. The functions of a key
/// are folded over the state object being built, starting from a no-op.
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use super::declaration::StateDeclaration;
use super::hierarchy::implied_parent;
use super::object::{LazyLoad, State, StateObject};
use crate::config::UrlConfig;
use crate::error::RouterError;
use crate::params::{Param, ParamDeclaration, ParamLocation, ParamSet, ParamTypes, SquashPolicy};
use crate::url::UrlMatcher;
use crate::view::ViewConfig;

/// Param id capturing the unmatched tail of a future state's URL
pub const REMAINDER: &str = "remainder";

/// Name of the fragment param every state inherits from the root
pub const HASH: &str = "#";

/// What a builder step can see besides the object under construction
pub struct BuildContext<'a> {
    pub declaration: &'a StateDeclaration,
    pub parent: Option<&'a State>,
    pub types: &'a ParamTypes,
    pub url_config: &'a UrlConfig,
}

pub type BuilderFn = Arc<dyn Fn(&BuildContext<'_>, &mut StateObject) -> Result<(), RouterError> + Send + Sync>;

/// Ordered builder steps keyed by property
#[derive(Clone)]
pub struct StateBuilder {
    steps: Vec<(String, Vec<BuilderFn>)>,
}

impl fmt::Debug for StateBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateBuilder").field("keys", &self.keys()).finish()
    }
}

impl Default for StateBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl StateBuilder {
    pub fn new() -> Self {
        let mut builder = Self { steps: Vec::new() };
        builder.builder("name", name_step);
        builder.builder("parent", parent_step);
        builder.builder("data", data_step);
        builder.builder("url", url_step);
        builder.builder("navigable", navigable_step);
        builder.builder("params", params_step);
        builder.builder("views", views_step);
        builder.builder("resolvables", resolvables_step);
        builder.builder("includes", includes_step);
        builder.builder("hooks", hooks_step);
        builder
    }

    /// Appends `step` to the functions of `key`; unknown keys run last
    pub fn builder<F>(&mut self, key: &str, step: F)
    where
        F: Fn(&BuildContext<'_>, &mut StateObject) -> Result<(), RouterError> + Send + Sync + 'static,
    {
        let step: BuilderFn = Arc::new(step);
        match self.steps.iter_mut().find(|(k, _)| k == key) {
            Some((_, functions)) => functions.push(step),
            None => self.steps.push((key.to_string(), vec![step])),
        }
    }

    pub fn keys(&self) -> Vec<&str> {
        self.steps.iter().map(|(k, _)| k.as_str()).collect()
    }

    /// The name of the parent a declaration needs before it can be built
    ///
    /// `None` only for the root.
    pub fn parent_name(declaration: &StateDeclaration) -> Result<Option<String>, RouterError> {
        let name = declaration.name.as_str();
        let base = name.strip_suffix(".**").unwrap_or(name);
        let implied = implied_parent(base);

        match (&declaration.parent, implied) {
            (None, implied) => Ok(implied.map(str::to_string)),
            (Some(parent), Some("")) => Ok(Some(parent.clone())),
            (Some(parent), Some(implied)) if parent == implied => Ok(Some(parent.clone())),
            (Some(parent), implied) => Err(RouterError::ParentMismatch {
                name: name.to_string(),
                parent: parent.clone(),
                implied: implied.unwrap_or_default().to_string(),
            }),
        }
    }

    /// Builds a state, or `Ok(None)` when its parent is not registered yet
    pub fn build(
        &self,
        declaration: &StateDeclaration,
        lookup: impl Fn(&str) -> Option<State>,
        types: &ParamTypes,
        url_config: &UrlConfig,
    ) -> Result<Option<State>, RouterError> {
        let parent = match Self::parent_name(declaration)? {
            Some(name) => match lookup(&name) {
                Some(parent) => Some(parent),
                None => return Ok(None),
            },
            None => None,
        };

        let context = BuildContext {
            declaration,
            parent: parent.as_ref(),
            types,
            url_config,
        };
        let object = self
            .steps
            .iter()
            .flat_map(|(_, functions)| functions.iter())
            .try_fold(StateObject::default(), |mut object, step| {
                step(&context, &mut object)?;
                Ok::<_, RouterError>(object)
            })?;

        Ok(Some(State::new(object)))
    }
}

fn name_step(context: &BuildContext<'_>, object: &mut StateObject) -> Result<(), RouterError> {
    object.name = context.declaration.name.clone();
    object.declaration = context.declaration.clone();
    object.is_abstract = context.declaration.is_abstract;
    Ok(())
}

fn parent_step(context: &BuildContext<'_>, object: &mut StateObject) -> Result<(), RouterError> {
    object.parent = context.parent.cloned();
    Ok(())
}

fn data_step(context: &BuildContext<'_>, object: &mut StateObject) -> Result<(), RouterError> {
    let mut data = context.parent.map(|p| p.data().clone()).unwrap_or_default();
    data.extend(context.declaration.data.iter().map(|(k, v)| (k.clone(), v.clone())));
    object.data = data;
    Ok(())
}

/// Param declarations, plus the remainder param of a future state
fn url_declarations(context: &BuildContext<'_>) -> BTreeMap<String, ParamDeclaration> {
    let mut declarations = context.declaration.params.clone();
    if context.declaration.is_future() {
        declarations.entry(REMAINDER.to_string()).or_insert_with(|| {
            ParamDeclaration::new()
                .with_default(serde_json::Value::String(String::new()))
                .with_squash(SquashPolicy::Slash)
        });
    }
    declarations
}

fn url_step(context: &BuildContext<'_>, object: &mut StateObject) -> Result<(), RouterError> {
    let Some(parent) = context.parent else {
        let root = UrlMatcher::compile("", &BTreeMap::new(), context.types, context.url_config)?;
        object.own_url = Some(root.clone());
        object.url = Some(root);
        return Ok(());
    };
    let Some(fragment) = context.declaration.url.as_deref() else {
        return Ok(());
    };

    let (absolute, fragment) = match fragment.strip_prefix('^') {
        Some(rest) => (true, rest),
        None => (false, fragment),
    };
    let fragment = if context.declaration.is_future() {
        let (path, search) = match fragment.split_once('?') {
            Some((path, search)) => (path, format!("?{search}")),
            None => (fragment, String::new()),
        };
        format!("{}/*{REMAINDER}{search}", path.trim_end_matches('/'))
    } else {
        fragment.to_string()
    };

    let own = UrlMatcher::compile(&fragment, &url_declarations(context), context.types, context.url_config)?;
    let full = if absolute {
        own.clone()
    } else {
        let base = parent
            .path()
            .into_iter()
            .rev()
            .find_map(|s| s.url().cloned());
        match base {
            Some(base) => base.append(&own)?,
            None => own.clone(),
        }
    };

    object.own_url = Some(own);
    object.url = Some(full);
    Ok(())
}

fn navigable_step(context: &BuildContext<'_>, object: &mut StateObject) -> Result<(), RouterError> {
    object.navigable = context.parent.is_some() && object.own_url.is_some();
    Ok(())
}

fn params_step(context: &BuildContext<'_>, object: &mut StateObject) -> Result<(), RouterError> {
    let mut own: Vec<Param> = object
        .own_url
        .as_ref()
        .map(|url| url.params().to_vec())
        .unwrap_or_default();

    let mut declarations: Vec<(&String, &ParamDeclaration)> = context.declaration.params.iter().collect();
    let root_hash = ParamDeclaration::new().with_type("hash");
    let hash_key = HASH.to_string();
    if context.parent.is_none() {
        declarations.push((&hash_key, &root_hash));
    }

    for (id, declaration) in declarations {
        if own.iter().any(|p| p.id() == id) {
            continue;
        }
        let location = if id == HASH {
            ParamLocation::Hash
        } else {
            ParamLocation::Config
        };
        own.push(Param::new(id.clone(), location, declaration, None, context.types)?);
    }

    if let Some(parent) = context.parent {
        let url_params = object.own_url.as_ref().map(|url| url.params()).unwrap_or_default();
        if let Some(clash) = url_params.iter().find(|p| parent.params().get(p.id()).is_some()) {
            return Err(RouterError::DuplicateParam {
                state: object.name.clone(),
                param: clash.id().to_string(),
            });
        }
    }

    object.params = Arc::new(match context.parent {
        Some(parent) => ParamSet::child(parent.params().clone(), own),
        None => ParamSet::new(own),
    });
    Ok(())
}

fn views_step(context: &BuildContext<'_>, object: &mut StateObject) -> Result<(), RouterError> {
    let parent = context.parent.map(|p| p.name().to_string()).unwrap_or_default();
    let depth = context.parent.map(|p| p.depth() + 1).unwrap_or_default();
    let view = |key: &str, config: serde_json::Value| ViewConfig::new(&object.name, depth, &parent, key, config);

    let mut views: Vec<ViewConfig> = context
        .declaration
        .views
        .iter()
        .map(|(key, config)| view(key, config.clone()))
        .collect();

    if let Some(component) = &context.declaration.component {
        if !views.iter().any(|v| v.name() == ViewConfig::DEFAULT && v.context() == parent) {
            views.push(view(ViewConfig::DEFAULT, serde_json::json!({ "component": component })));
        }
    }

    object.views = views;
    Ok(())
}

fn resolvables_step(context: &BuildContext<'_>, object: &mut StateObject) -> Result<(), RouterError> {
    object.resolvables = context.declaration.resolve.clone();
    Ok(())
}

fn includes_step(context: &BuildContext<'_>, object: &mut StateObject) -> Result<(), RouterError> {
    let mut includes = context.parent.map(|p| p.includes.clone()).unwrap_or_default();
    includes.insert(object.name.clone());
    object.includes = includes;
    Ok(())
}

fn hooks_step(context: &BuildContext<'_>, object: &mut StateObject) -> Result<(), RouterError> {
    let declaration = context.declaration;
    object.on_enter = declaration.on_enter.clone();
    object.on_exit = declaration.on_exit.clone();
    object.on_retain = declaration.on_retain.clone();
    object.redirect_to = declaration.redirect_to.clone();
    object.lazy_load = declaration.lazy_load.clone().map(|load| Arc::new(LazyLoad::new(load)));
    Ok(())
}
