//! Two-phase interpreter.
//!
//! Every template node gets a companion data object that holds its run-time
//! state. Input documents are fed one at a time through [`Runner::process_document`]
//! (the process phase); [`Runner::render`] then materializes the result.
//! Rendering does not consume the data objects, so it can be repeated and
//! interleaved with further documents.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use crate::{
    ast::{ArrowOp, ContextMode, ContextModifier, Key, ObjectTemplate, Order, Template},
    compiler::Query,
    context::{Context, RunOptions},
    evaluator::{Aggregate, QueryError, Result, json_equal},
    path::escape_field_name,
    store::{DocumentStore, Meta, XmlReader},
    timefmt,
    value::Value,
};

pub(crate) type DataId = usize;

/// Key of per-node state that depends on the enclosing data object:
/// aggregates, call sites and shared continuations.
pub(crate) type SlotKey = (usize, DataId);

/// Run-time state of one template node.
#[derive(Debug)]
pub(crate) struct Data<'a> {
    id: DataId,
    node: &'a Template,
    kind: Kind<'a>,
}

#[derive(Debug)]
enum Kind<'a> {
    Object(ObjectData<'a>),
    Array(Vec<Data<'a>>),
    Value(ValueData),
    ContextMod(Option<Box<Data<'a>>>),
    Or(Vec<Data<'a>>),
    Shared(Option<SlotKey>),
    WithCond(Option<Box<Data<'a>>>),
    Cond,
    Empty,
}

#[derive(Debug, Default)]
struct ValueData {
    value: Value,
    /// A non-aggregate value is read once
    updated: bool,
}

#[derive(Debug, Default)]
struct ObjectData<'a> {
    unsorted: Vec<(String, Data<'a>)>,
    index: HashMap<String, usize>,
    sorted: BTreeMap<String, Data<'a>>,
    /// Order number -> field holding the sort key
    ordering: BTreeMap<i64, (bool, String)>,
    returned: Option<Box<Data<'a>>>,
}

impl<'a> ObjectData<'a> {
    fn field(&self, key: &str, sorted: bool) -> Option<&Data<'a>> {
        if sorted {
            return self.sorted.get(key);
        }
        let i = *self.index.get(key)?;
        self.unsorted.get(i).map(|(_, data)| data)
    }

    fn field_mut(&mut self, key: &str, sorted: bool) -> Option<&mut Data<'a>> {
        if sorted {
            return self.sorted.get_mut(key);
        }
        let i = *self.index.get(key)?;
        self.unsorted.get_mut(i).map(|(_, data)| data)
    }

    fn store(&mut self, key: &str, data: Data<'a>, sorted: bool) {
        if sorted {
            self.sorted.insert(key.to_string(), data);
            return;
        }
        match self.index.get(key).and_then(|&i| self.unsorted.get_mut(i)) {
            Some(slot) => slot.1 = data,
            None => {
                self.index.insert(key.to_string(), self.unsorted.len());
                self.unsorted.push((key.to_string(), data));
            }
        }
    }

    fn is_empty(&self) -> bool {
        self.unsorted.is_empty() && self.sorted.is_empty()
    }
}

/// Entry of the data stack: the data object currently evaluating, and the
/// value it kept from the previous document (for `$prev`).
#[derive(Debug)]
struct Frame {
    id: DataId,
    prev: Value,
}

/// One component of the sort key of an array entry.
#[derive(Debug)]
struct KeyPart {
    num: i64,
    value: Value,
    order: Order,
}

pub(crate) struct Interpreter<'a> {
    pub(crate) ctx: Context<'a>,
    next_id: DataId,
    data_stack: Vec<Frame>,
    pub(crate) aggregates: HashMap<SlotKey, Aggregate>,
    pub(crate) calls: HashMap<SlotKey, Data<'a>>,
    shared: HashMap<SlotKey, Data<'a>>,
    pub(crate) rendering: bool,
    pub(crate) in_key: bool,
    pub(crate) call_depth: usize,
}

impl<'a> Interpreter<'a> {
    pub(crate) fn new(options: RunOptions) -> Self {
        Interpreter {
            ctx: Context::new(options),
            next_id: 0,
            data_stack: Vec::new(),
            aggregates: HashMap::new(),
            calls: HashMap::new(),
            shared: HashMap::new(),
            rendering: false,
            in_key: false,
            call_depth: 0,
        }
    }

    pub(crate) fn make_data(&mut self, node: &'a Template) -> Data<'a> {
        self.next_id += 1;
        let kind = match node {
            Template::Object(_) => Kind::Object(ObjectData::default()),
            Template::Array(_) => Kind::Array(Vec::new()),
            Template::Value { .. } => Kind::Value(ValueData::default()),
            Template::ContextMod(_) => Kind::ContextMod(None),
            Template::Or(_) => Kind::Or(Vec::new()),
            Template::Shared { .. } => Kind::Shared(None),
            Template::WithCond { .. } => Kind::WithCond(None),
            Template::CondWrapper(_) => Kind::Cond,
            Template::Placeholder => Kind::Empty,
        };
        Data {
            id: self.next_id,
            node,
            kind,
        }
    }

    /// Id of the innermost data object being evaluated; 0 at the top.
    pub(crate) fn current_data(&self) -> DataId {
        self.data_stack.last().map(|f| f.id).unwrap_or(0)
    }

    pub(crate) fn previous_value(&self) -> Value {
        self.data_stack
            .last()
            .map(|f| f.prev.clone())
            .unwrap_or(Value::Null)
    }

    fn with_data<T>(&mut self, id: DataId, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.data_stack.push(Frame {
            id,
            prev: Value::Null,
        });
        let result = f(self);
        self.data_stack.pop();
        result
    }

    /// Runs `f` with `sub` appended to the current path.
    fn at<T>(&mut self, sub: &str, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.ctx.add_to_path(sub);
        let result = f(self);
        self.ctx.pop_path();
        result
    }

    fn local<T>(&mut self, root: Value, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.ctx.start_local(root);
        let result = f(self);
        self.ctx.end_document();
        result
    }

    // ========================================================================
    // Process phase
    // ========================================================================

    /// Feeds the current position to `data`. Returns whether it produced a
    /// value.
    pub(crate) fn process(&mut self, data: &mut Data<'a>) -> Result<bool> {
        let id = data.id;
        match (data.node, &mut data.kind) {
            (Template::Object(template), Kind::Object(object)) => {
                self.process_object(id, template, object)
            }
            (Template::Array(alternatives), Kind::Array(items)) => {
                let mut matched = false;
                for alternative in alternatives {
                    let mut item = self.make_data(alternative);
                    if self.process(&mut item)? {
                        items.push(item);
                        matched = true;
                    }
                }
                Ok(matched)
            }
            (Template::Value { expr, .. }, Kind::Value(state)) => {
                if state.updated && !expr.is_aggregate() {
                    return Ok(false);
                }
                let prev = if expr.uses_prev() {
                    state.value.clone()
                } else {
                    Value::Null
                };
                self.data_stack.push(Frame { id, prev });
                let result = self.eval(expr);
                self.data_stack.pop();
                state.value = result?;
                if state.value.is_null() {
                    return Ok(self.ctx.options().show_nulls);
                }
                state.updated = true;
                Ok(true)
            }
            (Template::ContextMod(modifier), Kind::ContextMod(slot)) => {
                let inner = slot.get_or_insert_with(|| Box::new(self.make_data(&modifier.inner)));
                if self.rendering {
                    return self.process(inner);
                }
                self.context_mod(modifier, inner)
            }
            (Template::Or(alternatives), Kind::Or(items)) => {
                while items.len() < alternatives.len() {
                    let item = self.make_data(&alternatives[items.len()]);
                    items.push(item);
                }
                if self.rendering {
                    return match items.first_mut() {
                        Some(first) => self.process(first),
                        None => Ok(false),
                    };
                }
                self.with_data(id, |this| {
                    let mut matched = false;
                    for item in items.iter_mut() {
                        matched = this.process(item)? || matched;
                    }
                    Ok(matched)
                })
            }
            (Template::Shared { id: shared, inner }, Kind::Shared(key)) => {
                let key = *key.get_or_insert((*shared, self.current_data()));
                let mut data = match self.shared.remove(&key) {
                    Some(data) => data,
                    None => self.make_data(inner),
                };
                let result = self.process(&mut data);
                self.shared.insert(key, data);
                result
            }
            (Template::WithCond { inner, cond }, Kind::WithCond(slot)) => {
                let data = slot.get_or_insert_with(|| Box::new(self.make_data(inner)));
                if cond.is_aggregate() {
                    // Only keeps the aggregates current; the result gates rendering.
                    self.with_data(id, |this| this.test(cond))?;
                } else if !self.rendering && !self.test(cond)? {
                    return Ok(false);
                }
                self.process(data)
            }
            (Template::CondWrapper(cond), _) => self.test(cond),
            _ => Ok(false),
        }
    }

    fn process_object(
        &mut self,
        id: DataId,
        template: &'a ObjectTemplate,
        object: &mut ObjectData<'a>,
    ) -> Result<bool> {
        let mut locals = Vec::new();
        let result = self.with_data(id, |this| this.process_fields(template, object, &mut locals));
        for name in locals {
            self.ctx.pop_var(name);
        }
        result
    }

    fn process_fields(
        &mut self,
        template: &'a ObjectTemplate,
        object: &mut ObjectData<'a>,
        locals: &mut Vec<&'a str>,
    ) -> Result<bool> {
        for field in &template.fields {
            match &field.key {
                Key::Cond | Key::Exists => {
                    let mut gate = self.make_data(&field.value);
                    if !self.process(&mut gate)? && !field.value.is_aggregate() {
                        return Ok(false);
                    }
                }
                Key::NotExists => {
                    let mut probe = self.make_data(&field.value);
                    if self.process(&mut probe)? {
                        return Ok(false);
                    }
                }
                Key::Func { name, params } => self.ctx.add_func(name, &field.value, params),
                Key::Variable(name) | Key::Assign(name) => {
                    let mut data = self.make_data(&field.value);
                    self.process(&mut data)?;
                    let value = self.render(&mut data)?;
                    if matches!(field.key, Key::Variable(_)) {
                        self.ctx.add_var(name, value);
                        locals.push(name.as_str());
                    } else {
                        self.ctx.assign_var(name, value);
                    }
                }
                Key::Return => {
                    let returned = object
                        .returned
                        .get_or_insert_with(|| Box::new(self.make_data(&field.value)));
                    return self.process(returned);
                }
                Key::ReturnIf => {
                    if let Some(returned) = object.returned.as_mut() {
                        return self.process(returned);
                    }
                    let mut candidate = self.make_data(&field.value);
                    if self.process(&mut candidate)? {
                        object.returned = Some(Box::new(candidate));
                        return Ok(true);
                    }
                }
                Key::Name(_) | Key::Param(_) | Key::Regex(_) => {
                    let sorted = field.key.is_sorted();
                    for key in self.keys(&field.key)? {
                        self.ctx.push_reskey(&key);
                        let result = self.process_field(object, &key, &field.value, sorted);
                        self.ctx.pop_reskey();
                        result?;
                    }
                }
            }
        }
        Ok(!object.is_empty())
    }

    fn process_field(
        &mut self,
        object: &mut ObjectData<'a>,
        key: &str,
        node: &'a Template,
        sorted: bool,
    ) -> Result<()> {
        match object.field_mut(key, sorted) {
            Some(data) => {
                self.process(data)?;
            }
            None => {
                let mut data = self.make_data(node);
                if self.process(&mut data)? {
                    object.store(key, data, sorted);
                }
            }
        }
        if node.is_ordered() {
            object
                .ordering
                .insert(node.order_number(), (sorted, key.to_string()));
        }
        Ok(())
    }

    /// Result keys a field key stands for at the current position.
    fn keys(&mut self, key: &'a Key) -> Result<Vec<String>> {
        Ok(match key {
            Key::Name(name) => vec![name.clone()],
            Key::Param(expr) => {
                let was_in_key = std::mem::replace(&mut self.in_key, true);
                let value = self.eval(expr);
                self.in_key = was_in_key;
                let key = value?.to_text();
                if key.is_empty() { Vec::new() } else { vec![key] }
            }
            Key::Regex(pattern) => self
                .ctx
                .members()
                .into_iter()
                .filter(|member| pattern.is_match(member))
                .collect(),
            _ => Vec::new(),
        })
    }

    // ========================================================================
    // Context modifiers
    // ========================================================================

    fn context_mod(&mut self, modifier: &'a ContextModifier, data: &mut Data<'a>) -> Result<bool> {
        if modifier.new_frame {
            self.ctx.begin_frame();
        }
        let result = self.apply_mode(modifier, data);
        if modifier.new_frame {
            self.ctx.end_frame();
        }
        result
    }

    fn apply_mode(&mut self, modifier: &'a ContextModifier, data: &mut Data<'a>) -> Result<bool> {
        match &modifier.mode {
            ContextMode::None if modifier.path.is_empty() => self.process(data),
            ContextMode::None => self.at(&modifier.path, |this| this.process(data)),
            ContextMode::Eval => {
                let Some(expr) = &modifier.expr else {
                    return Ok(false);
                };
                let path = self.eval(expr)?.to_text();
                self.at(&path, |this| this.process(data))
            }
            ContextMode::Array => {
                let size = self.ctx.meta(&modifier.path).array_size();
                self.at(&modifier.path, |this| {
                    let mut matched = false;
                    for i in 0..size {
                        matched = this.at(&format!("[{}]", i), |this| this.process(data))? || matched;
                    }
                    if size == 0
                        && !modifier.path.is_empty()
                        && modifier.path != "."
                        && matches!(this.ctx.meta(""), Meta::Object(_))
                    {
                        matched = this.process(data)?;
                    }
                    Ok(matched)
                })
            }
            ContextMode::Regex(pattern) => {
                let mut matched = false;
                for member in self.ctx.members() {
                    if pattern.is_match(&member) {
                        let sub = escape_field_name(&member);
                        matched = self.at(&sub, |this| this.process(data))? || matched;
                    }
                }
                Ok(matched)
            }
            ContextMode::AllPaths => self.all_paths(data),
            ContextMode::Reskey => {
                let sub = escape_field_name(self.ctx.reskey());
                self.at(&sub, |this| this.process(data))
            }
            ContextMode::Arrow => self.handle_arrow(modifier, data),
        }
    }

    /// The current value and every value below it, depth first.
    fn all_paths(&mut self, data: &mut Data<'a>) -> Result<bool> {
        let mut matched = self.process(data)?;
        match self.ctx.meta("") {
            Meta::Array(size) => {
                for i in 0..size {
                    matched = self.at(&format!("[{}]", i), |this| this.all_paths(data))? || matched;
                }
            }
            Meta::Object(members) => {
                for member in members {
                    let sub = escape_field_name(&member);
                    matched = self.at(&sub, |this| this.all_paths(data))? || matched;
                }
            }
            _ => {}
        }
        Ok(matched)
    }

    fn handle_arrow(&mut self, modifier: &'a ContextModifier, data: &mut Data<'a>) -> Result<bool> {
        let current = self.ctx.identifier().to_string();
        let mut matched = false;
        if matches!(
            modifier.arrow,
            ArrowOp::Itself | ArrowOp::AncestorsAndSelf | ArrowOp::DescendantsAndSelf
        ) {
            matched = self.process_identifier(modifier, data, &current)?;
        }

        let found = match modifier.arrow {
            ArrowOp::Var => {
                let value = self.ctx.var(&modifier.path).clone();
                if value.is_null() {
                    return Ok(false);
                }
                self.local(value, |this| this.process(data))?
            }
            ArrowOp::File | ArrowOp::Other => {
                let Some(expr) = &modifier.expr else {
                    return Ok(false);
                };
                let filename = if modifier.arrow == ArrowOp::File {
                    self.file_name(expr)?
                } else {
                    None
                };
                if let Some(name) = &filename {
                    self.ctx.push_filename(name);
                }
                let result = match self.eval(expr) {
                    Ok(Value::Null) => Ok(false),
                    Ok(value) => self.local(value, |this| this.process(data)),
                    Err(e) => Err(e),
                };
                if filename.is_some() {
                    self.ctx.pop_filename();
                }
                result?
            }
            ArrowOp::Date => {
                let date = match &modifier.expr {
                    Some(expr) => match self.eval(expr)? {
                        Value::Integer(epoch) => Some(epoch),
                        other => timefmt::parse_date(&other.to_text()),
                    },
                    None => None,
                };
                let saved = self.ctx.store_mut().set_date(date);
                let result = self.process(data);
                self.ctx.store_mut().set_date(saved);
                result?
            }
            ArrowOp::Branch => {
                let branch = match &modifier.expr {
                    Some(expr) => Some(self.eval(expr)?.to_text()).filter(|b| !b.is_empty()),
                    None => None,
                };
                let saved = self.ctx.store_mut().set_branch(branch);
                let result = self.process(data);
                self.ctx.store_mut().set_branch(saved);
                result?
            }
            ArrowOp::None => self.arrow_targets(modifier, data)?,
            ArrowOp::Parent | ArrowOp::Ancestors | ArrowOp::AncestorsAndSelf => {
                let min = self.ctx.options().parent_prefix_len;
                let mut identifier = current.clone();
                let mut found = false;
                while let Some(pos) = identifier.rfind('/')
                    && pos > min
                {
                    identifier.truncate(pos);
                    found = self.process_identifier(modifier, data, &identifier)? || found;
                    if modifier.arrow == ArrowOp::Parent {
                        break;
                    }
                }
                found
            }
            ArrowOp::Children | ArrowOp::Descendants | ArrowOp::DescendantsAndSelf | ArrowOp::All => {
                let identifiers = if modifier.arrow == ArrowOp::All {
                    self.ctx.store().identifiers()
                } else {
                    self.ctx
                        .store()
                        .descendants(&current, modifier.arrow == ArrowOp::Children)
                };
                let mut found = false;
                for identifier in identifiers.iter().filter(|id| **id != current) {
                    found = self.process_identifier(modifier, data, identifier)? || found;
                }
                found
            }
            ArrowOp::Itself => false,
        };
        Ok(matched || found)
    }

    /// Plain arrows: a quoted identifier, or identifiers read from a field
    /// or computed by an expression.
    fn arrow_targets(&mut self, modifier: &'a ContextModifier, data: &mut Data<'a>) -> Result<bool> {
        let path = modifier.path.as_str();
        if let Some(identifier) = unquote(path) {
            return self.process_identifier(modifier, data, identifier);
        }
        let target = match &modifier.expr {
            Some(expr) => self.eval(expr)?,
            None => self.ctx.value(path),
        };
        match target {
            Value::String(identifier) => self.process_identifier(modifier, data, &identifier),
            Value::Array(identifiers) => {
                let mut found = false;
                for identifier in identifiers {
                    found = self.process_identifier(modifier, data, &identifier.to_text())? || found;
                }
                Ok(found)
            }
            Value::Null => Ok(false),
            _ => Err(QueryError::new(format!(
                "Expected array or string at ->{}{{{}}}",
                self.ctx.identifier(),
                self.ctx.full_path(path)
            ))),
        }
    }

    fn process_identifier(
        &mut self,
        modifier: &'a ContextModifier,
        data: &mut Data<'a>,
        identifier: &str,
    ) -> Result<bool> {
        log::debug!("following arrow to {}", identifier);
        self.ctx.start_identifier(identifier);
        let result = if modifier.arrow == ArrowOp::None || modifier.path.is_empty() {
            self.process(data)
        } else {
            self.at(&modifier.path, |this| this.process(data))
        };
        self.ctx.end_document();
        result
    }

    // ========================================================================
    // Render phase
    // ========================================================================

    /// Materializes the value of `data`. Aggregates report their totals and
    /// ordered arrays are sorted.
    pub(crate) fn render(&mut self, data: &mut Data<'a>) -> Result<Value> {
        let was_rendering = std::mem::replace(&mut self.rendering, true);
        let result = self.render_data(data);
        self.rendering = was_rendering;
        result
    }

    fn render_data(&mut self, data: &mut Data<'a>) -> Result<Value> {
        let id = data.id;
        let show_nulls = self.ctx.options().show_nulls;
        match (data.node, &mut data.kind) {
            (Template::Object(template), Kind::Object(object)) => {
                if let Some(returned) = object.returned.as_mut() {
                    return self.render(returned);
                }
                for field in &template.fields {
                    if matches!(field.key, Key::Cond | Key::Exists) && field.value.is_aggregate() {
                        let mut gate = self.make_data(&field.value);
                        if !self.with_data(id, |this| this.process(&mut gate))? {
                            return Ok(Value::Null);
                        }
                    }
                }
                let mut members = Vec::new();
                for (key, field) in object.unsorted.iter_mut() {
                    let value = self.render(field)?;
                    if show_nulls || !value.is_null() {
                        members.push((key.clone(), value));
                    }
                }
                for (key, field) in object.sorted.iter_mut() {
                    let value = self.render(field)?;
                    if show_nulls || !value.is_null() {
                        members.push((key.clone(), value));
                    }
                }
                Ok(Value::Object(members))
            }
            (Template::Array(alternatives), Kind::Array(items)) => {
                if alternatives.iter().any(Template::is_ordered) {
                    self.sort_items(items);
                }
                let mut values = Vec::with_capacity(items.len());
                for item in items.iter_mut() {
                    let value = self.render(item)?;
                    if show_nulls || !value.is_null() {
                        values.push(value);
                    }
                }
                Ok(Value::Array(values))
            }
            (Template::Value { .. }, Kind::Value(state)) => Ok(state.value.clone()),
            (_, Kind::ContextMod(Some(inner))) => self.render(inner),
            (_, Kind::Or(items)) => {
                for item in items.iter_mut() {
                    let value = self.render(item)?;
                    if !value.is_null() {
                        return Ok(value);
                    }
                }
                Ok(Value::Null)
            }
            (_, Kind::Shared(Some(key))) => {
                let key = *key;
                let Some(mut shared) = self.shared.remove(&key) else {
                    return Ok(Value::Null);
                };
                let result = self.render(&mut shared);
                self.shared.insert(key, shared);
                result
            }
            (Template::WithCond { cond, .. }, Kind::WithCond(slot)) => {
                if cond.is_aggregate() && !self.with_data(id, |this| this.test(cond))? {
                    return Ok(Value::Null);
                }
                match slot {
                    Some(inner) => self.render(inner),
                    None => Ok(Value::Null),
                }
            }
            _ => Ok(Value::Null),
        }
    }

    // ========================================================================
    // Ordering
    // ========================================================================

    /// Stable sort by the ordering keys of the entries; unique orderings also
    /// drop entries equal to their predecessor.
    fn sort_items(&self, items: &mut Vec<Data<'a>>) {
        let mut keyed: Vec<(Vec<KeyPart>, Data<'a>)> = items
            .drain(..)
            .map(|item| (self.sort_key(&item), item))
            .collect();
        let textual = mixes_text(keyed.iter().flat_map(|(key, _)| key));
        keyed.sort_by(|a, b| compare_keys(&a.0, &b.0, textual));
        keyed.dedup_by(|next, prev| same_keys(&prev.0, &next.0));
        items.extend(keyed.into_iter().map(|(_, item)| item));
    }

    fn sort_key(&self, data: &Data<'a>) -> Vec<KeyPart> {
        if let Kind::Object(object) = &data.kind {
            return object
                .ordering
                .iter()
                .map(|(num, (sorted, key))| {
                    let (value, order) = object
                        .field(key, *sorted)
                        .and_then(|field| self.ordered_value(field))
                        .unwrap_or((Value::Null, Order::Ascending));
                    KeyPart {
                        num: *num,
                        value,
                        order,
                    }
                })
                .collect();
        }
        self.ordered_value(data)
            .map(|(value, order)| {
                vec![KeyPart {
                    num: data.node.order_number(),
                    value,
                    order,
                }]
            })
            .unwrap_or_default()
    }

    fn ordered_value(&self, data: &Data<'a>) -> Option<(Value, Order)> {
        match (data.node, &data.kind) {
            (Template::Value { order, .. }, Kind::Value(state)) => Some((state.value.clone(), *order)),
            (_, Kind::ContextMod(Some(inner)) | Kind::WithCond(Some(inner))) => {
                self.ordered_value(inner)
            }
            (_, Kind::Shared(Some(key))) => self
                .shared
                .get(key)
                .and_then(|shared| self.ordered_value(shared)),
            _ => None,
        }
    }
}

fn unquote(path: &str) -> Option<&str> {
    let quote = path.chars().next().filter(|c| *c == '"' || *c == '\'')?;
    let inner = path.strip_prefix(quote)?;
    Some(inner.strip_suffix(quote).unwrap_or(inner))
}

/// Strings and numbers among the keys: everything compares as text.
fn mixes_text<'k>(parts: impl Iterator<Item = &'k KeyPart>) -> bool {
    let (mut strings, mut numbers) = (false, false);
    for part in parts {
        match part.value {
            Value::String(_) => strings = true,
            Value::Integer(_) | Value::Float(_) => numbers = true,
            _ => {}
        }
    }
    strings && numbers
}

fn compare_sort_values(a: &Value, b: &Value, textual: bool) -> Ordering {
    let rank = |v: &Value| match v {
        Value::Null => 0,
        Value::Boolean(_) => 1,
        Value::Integer(_) | Value::Float(_) => 2,
        Value::String(_) if textual => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    };
    rank(a).cmp(&rank(b)).then_with(|| match (a, b) {
        _ if textual && rank(a) == 2 => a.to_text().cmp(&b.to_text()),
        (Value::Integer(x), Value::Integer(y)) => x.cmp(y),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Boolean(x), Value::Boolean(y)) => x.cmp(y),
        (Value::Integer(_) | Value::Float(_), Value::Integer(_) | Value::Float(_)) => {
            a.to_float().total_cmp(&b.to_float())
        }
        _ => Ordering::Equal,
    })
}

fn compare_keys(a: &[KeyPart], b: &[KeyPart], textual: bool) -> Ordering {
    let nums = |key: &[KeyPart]| key.iter().map(|p| p.num).collect::<Vec<_>>();
    let shape = nums(a).cmp(&nums(b));
    if shape != Ordering::Equal {
        return shape;
    }
    for (x, y) in a.iter().zip(b) {
        if x.order == Order::None {
            continue;
        }
        let ordering = compare_sort_values(&x.value, &y.value, textual);
        let ordering = if x.order.is_descending() {
            ordering.reverse()
        } else {
            ordering
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

fn same_keys(a: &[KeyPart], b: &[KeyPart]) -> bool {
    !a.is_empty()
        && a.len() == b.len()
        && a.iter().zip(b).all(|(x, y)| {
            x.num == y.num && x.order.is_unique() && json_equal(&x.value, &y.value)
        })
}

/// Drives a compiled query over a sequence of documents.
///
/// # Examples
///
/// ```
/// use unq_lang::{compile, RunOptions, Runner, Value};
///
/// let template = serde_json::from_str(r#"{"count": "$count"}"#).unwrap();
/// let query = compile(&unq_lang::convert::from_json(template)).unwrap();
///
/// let mut runner = Runner::new(&query, RunOptions::default());
/// for _ in 0..3 {
///     runner.process_document(Value::Object(Vec::new()), "input.json").unwrap();
/// }
/// let result = runner.render().unwrap();
/// assert_eq!(result.get("count"), Some(&Value::Integer(3)));
/// ```
pub struct Runner<'a> {
    interpreter: Interpreter<'a>,
    root: Data<'a>,
    documents: usize,
}

impl<'a> Runner<'a> {
    pub fn new(query: &'a Query, options: RunOptions) -> Self {
        let mut interpreter = Interpreter::new(options);
        let root = interpreter.make_data(&query.root);
        Runner {
            interpreter,
            root,
            documents: 0,
        }
    }

    /// Documents reached through `->` come from `store`.
    pub fn with_store(mut self, store: impl DocumentStore + 'a) -> Self {
        self.interpreter.ctx.set_store(Box::new(store));
        self
    }

    pub fn with_xml(mut self, xml: impl XmlReader + 'a) -> Self {
        self.interpreter.ctx.set_xml(Box::new(xml));
        self
    }

    /// Processes one input document. `filename` is what `$filename` reports.
    pub fn process_document(&mut self, document: Value, filename: &str) -> Result<bool> {
        self.process(document, "", filename)
    }

    /// Processes the store document behind `identifier`.
    pub fn process_identifier(&mut self, identifier: &str) -> Result<bool> {
        let document = self
            .interpreter
            .ctx
            .store()
            .document(identifier)
            .unwrap_or(Value::Null);
        self.process(document, identifier, identifier)
    }

    fn process(&mut self, document: Value, identifier: &str, filename: &str) -> Result<bool> {
        self.documents += 1;
        log::debug!("processing document {} from {}", self.documents, filename);
        self.interpreter.ctx.reset(document, identifier, filename);
        self.interpreter.process(&mut self.root)
    }

    /// The result over every document processed so far.
    pub fn render(&mut self) -> Result<Value> {
        self.interpreter.render(&mut self.root)
    }

    pub fn documents(&self) -> usize {
        self.documents
    }
}

/// Runs `query` over `documents` and renders the result.
pub fn run(
    query: &Query,
    documents: impl IntoIterator<Item = Value>,
    options: RunOptions,
) -> Result<Value> {
    let mut runner = Runner::new(query, options);
    for document in documents {
        runner.process_document(document, "")?;
    }
    runner.render()
}
