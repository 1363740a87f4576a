//! Message rendering on top of a [`Translator`]

use crate::services::Translator;
use std::fmt::Display;

/// Translator bound to one request's language preferences
#[derive(Clone, Copy)]
pub struct Messages<'a> {
    translator: &'a dyn Translator,
    langprefs: &'a [String],
}

impl<'a> Messages<'a> {
    pub fn new(translator: &'a dyn Translator, langprefs: &'a [String]) -> Self {
        Self {
            translator,
            langprefs,
        }
    }

    /// Translated message without arguments
    pub fn text(&self, msgid: &str) -> String {
        self.translator.translate(msgid, self.langprefs)
    }

    /// Translated message with `%s`/`%d` placeholders filled in order
    pub fn format(&self, msgid: &str, args: &[&dyn Display]) -> String {
        fill_placeholders(&self.text(msgid), args)
    }

    pub fn langprefs(&self) -> &'a [String] {
        self.langprefs
    }
}

/// Replace `%s` and `%d` placeholders left to right; surplus placeholders stay
pub fn fill_placeholders(template: &str, args: &[&dyn Display]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut args = args.iter();
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '%' {
            if let Some(&spec) = chars.peek() {
                if spec == 's' || spec == 'd' {
                    if let Some(arg) = args.next() {
                        chars.next();
                        out.push_str(&arg.to_string());
                        continue;
                    }
                }
            }
        }
        out.push(c);
    }
    out
}
