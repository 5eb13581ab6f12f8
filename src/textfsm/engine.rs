use super::template::{Template, Transition};

/// One record emitted by a template: every declared value in declaration
/// order, unset values as empty strings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    fields: Vec<(String, String)>,
}

impl Record {
    /// Value captured for `name`, or `""` when unset or undeclared
    pub fn get(&self, name: &str) -> &str {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
            .unwrap_or("")
    }
}

#[cfg(test)]
impl Record {
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// State of a single pass over some input
struct Run<'t> {
    template: &'t Template,
    state: usize,
    pending: Vec<Option<String>>,
    records: Vec<Record>,
    finished: bool,
}

impl<'t> Run<'t> {
    fn new(template: &'t Template) -> Self {
        Self {
            template,
            state: 0,
            pending: vec![None; template.values.len()],
            records: Vec::new(),
            finished: false,
        }
    }

    /// Apply the first matching rule of `state` to `line`
    fn feed(&mut self, state: usize, line: &str) {
        let template = self.template;
        let Some(rule) = template.states[state]
            .rules
            .iter()
            .find(|rule| rule.regex.is_match(line))
        else {
            return;
        };

        if !rule.captures.is_empty() {
            if let Some(caps) = rule.regex.captures(line) {
                for &idx in &rule.captures {
                    if let Some(m) = caps.name(&template.values[idx].name) {
                        self.pending[idx] = Some(m.as_str().to_string());
                    }
                }
            }
        }

        if rule.action.record {
            self.record();
        }

        match rule.action.transition {
            Some(Transition::State(next)) => self.state = next,
            Some(Transition::End) => self.finished = true,
            None => {}
        }
    }

    /// Emit the pending record and clear every non-filldown value
    fn record(&mut self) {
        let values = &self.template.values;
        let has_value = self.pending.iter().any(Option::is_some);
        let missing_required = values
            .iter()
            .zip(&self.pending)
            .any(|(def, value)| def.required && value.is_none());

        if has_value && !missing_required {
            self.records.push(
                values
                    .iter()
                    .zip(&self.pending)
                    .map(|(def, value)| (def.name.clone(), value.clone().unwrap_or_default()))
                    .collect(),
            );
        }

        for (def, value) in values.iter().zip(self.pending.iter_mut()) {
            if !def.filldown {
                *value = None;
            }
        }
    }

    fn finish(mut self) -> Vec<Record> {
        if !self.finished {
            if let Some(eof) = self.template.eof_state {
                self.feed(eof, "");
            }
        }
        self.records
    }
}

impl Template {
    /// Run the template over `text` line by line and return every emitted
    /// record in order. Values still pending at end of input are dropped
    /// unless the template declares an `EOF` state that records them.
    pub fn extract(&self, text: &str) -> Vec<Record> {
        let mut run = Run::new(self);
        for line in text.lines() {
            if run.finished {
                break;
            }
            let line = line.strip_suffix('\r').unwrap_or(line);
            run.feed(run.state, line);
        }
        run.finish()
    }
}
