// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! Form discovery in page markup using html5ever

use html5ever::parse_document;
use html5ever::tendril::TendrilSink;
use html5ever::ParseOpts;
use markup5ever_rcdom::{Handle, NodeData, RcDom};

use super::form::{FormField, FormState};
use crate::error::{ErrorContext, Result};

/// Parse `html` and collect every `<form>` with its controls
pub(crate) fn parse_forms(html: &str) -> Result<Vec<FormState>> {
    let dom = parse_document(RcDom::default(), ParseOpts::default())
        .from_utf8()
        .read_from(&mut html.as_bytes())
        .context("failed to parse page HTML")?;

    let mut forms = Vec::new();
    collect_forms(&dom.document, &mut forms);
    Ok(forms)
}

fn collect_forms(handle: &Handle, forms: &mut Vec<FormState>) {
    if tag_name(handle).as_deref() == Some("form") {
        let mut fields = Vec::new();
        collect_fields(handle, &mut fields);
        forms.push(FormState {
            id: attribute(handle, "id"),
            name: attribute(handle, "name"),
            action: attribute(handle, "action"),
            method: attribute(handle, "method"),
            enctype: attribute(handle, "enctype"),
            fields,
        });
        return;
    }
    for child in handle.children.borrow().iter() {
        collect_forms(child, forms);
    }
}

fn collect_fields(handle: &Handle, fields: &mut Vec<FormField>) {
    for child in handle.children.borrow().iter() {
        match tag_name(child).as_deref() {
            Some("input") => {
                let field_type = attribute(child, "type")
                    .unwrap_or_else(|| "text".to_string())
                    .to_ascii_lowercase();
                fields.push(FormField {
                    name: attribute(child, "name"),
                    value: attribute(child, "value"),
                    disabled: has_attribute(child, "disabled"),
                    checked: has_attribute(child, "checked"),
                    field_type,
                });
            }
            Some("textarea") => fields.push(FormField {
                name: attribute(child, "name"),
                field_type: "textarea".to_string(),
                value: Some(text_content(child)),
                disabled: has_attribute(child, "disabled"),
                checked: false,
            }),
            Some("select") => fields.push(FormField {
                name: attribute(child, "name"),
                field_type: "select".to_string(),
                value: selected_option(child),
                disabled: has_attribute(child, "disabled"),
                checked: false,
            }),
            _ => collect_fields(child, fields),
        }
    }
}

/// Value of the selected option, or the first one
fn selected_option(select: &Handle) -> Option<String> {
    let mut options = Vec::new();
    collect_options(select, &mut options);
    let chosen = options
        .iter()
        .find(|o| has_attribute(o, "selected"))
        .or_else(|| options.first())?;
    Some(attribute(chosen, "value").unwrap_or_else(|| text_content(chosen).trim().to_string()))
}

fn collect_options(handle: &Handle, options: &mut Vec<Handle>) {
    for child in handle.children.borrow().iter() {
        if tag_name(child).as_deref() == Some("option") {
            options.push(child.clone());
        } else {
            collect_options(child, options);
        }
    }
}

fn tag_name(handle: &Handle) -> Option<String> {
    match handle.data {
        NodeData::Element { ref name, .. } => Some(name.local.to_string()),
        _ => None,
    }
}

fn attribute(handle: &Handle, wanted: &str) -> Option<String> {
    match handle.data {
        NodeData::Element { ref attrs, .. } => attrs
            .borrow()
            .iter()
            .find(|a| &*a.name.local == wanted)
            .map(|a| a.value.to_string()),
        _ => None,
    }
}

fn has_attribute(handle: &Handle, wanted: &str) -> bool {
    attribute(handle, wanted).is_some()
}

fn text_content(handle: &Handle) -> String {
    let mut text = String::new();
    append_text(handle, &mut text);
    text
}

fn append_text(handle: &Handle, out: &mut String) {
    if let NodeData::Text { ref contents } = handle.data {
        out.push_str(&contents.borrow());
    }
    for child in handle.children.borrow().iter() {
        append_text(child, out);
    }
}
