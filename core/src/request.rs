//! XML request builder.
//!
//! # Design
//! Requests are assembled as a small element tree and serialized with
//! `quick_xml::Writer`, so text and attribute values are always escaped and
//! tags always balance. Names are validated when an `Element` is created and
//! values are checked for characters XML 1.0 cannot carry; both fail with
//! `ApiError::MalformedInput` instead of producing a broken document.
//!
//! Attributes are written with single quotes and empty elements as an
//! explicit start/end pair (`<name></name>`), matching the server's grammar:
//!
//! ```text
//! <?xml version='1.0' encoding='utf8' ?>
//! <request>
//!   <action type='list' uid='80085'>
//!     <structure name='contacts'>
//!       <fields>..</fields><filters>..</filters><orders>..</orders><limit>..</limit>
//!     </structure>
//!   </action>
//! </request>
//! ```

use quick_xml::escape::escape;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

use crate::error::ApiError;
use crate::types::{ActionType, Field, Filter, Limit, Order, PROTOCOL_UID};

const DECLARATION: &str = "xml version='1.0' encoding='utf8' ";

/// An XML element with either text content or child elements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    name: String,
    attributes: Vec<(String, String)>,
    text: String,
    children: Vec<Element>,
}

impl Element {
    /// Creates an empty element. Fails if `name` is not a valid XML name.
    pub fn new(name: &str) -> Result<Self, ApiError> {
        validate_name(name)?;
        Ok(Self {
            name: name.to_string(),
            attributes: Vec::new(),
            text: String::new(),
            children: Vec::new(),
        })
    }

    pub fn with_attr(mut self, name: &str, value: &str) -> Result<Self, ApiError> {
        validate_name(name)?;
        validate_chars(value)?;
        self.attributes.push((name.to_string(), value.to_string()));
        Ok(self)
    }

    pub fn with_text(mut self, text: &str) -> Result<Self, ApiError> {
        validate_chars(text)?;
        self.text = text.to_string();
        Ok(self)
    }

    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn children(&self) -> &[Element] {
        &self.children
    }

    /// Serializes this element (without an XML declaration).
    pub fn to_xml(&self) -> Result<String, ApiError> {
        let mut writer = Writer::new(Vec::new());
        self.write(&mut writer)?;
        into_string(writer)
    }

    fn write(&self, writer: &mut Writer<Vec<u8>>) -> Result<(), ApiError> {
        let mut start = self.name.clone();
        for (key, value) in &self.attributes {
            start.push_str(&format!(" {key}='{}'", escape(value.as_str())));
        }
        writer
            .write_event(Event::Start(BytesStart::from_content(start, self.name.len())))
            .map_err(write_error)?;
        if !self.text.is_empty() {
            writer
                .write_event(Event::Text(BytesText::new(&self.text)))
                .map_err(write_error)?;
        }
        for child in &self.children {
            child.write(writer)?;
        }
        writer
            .write_event(Event::End(BytesEnd::new(self.name.as_str())))
            .map_err(write_error)?;
        Ok(())
    }
}

/// `<fields>` with one child per field, in order. Bare fields become empty
/// elements.
pub fn fields_element(fields: &[Field]) -> Result<Element, ApiError> {
    fields
        .iter()
        .try_fold(Element::new("fields")?, |acc, field| -> Result<Element, ApiError> {
            Ok(acc.with_child(Element::new(field.name())?.with_text(field.value())?))
        })
}

/// `<filters>` with one `<filter><field/><operation/><value/></filter>` per entry.
pub fn filters_element(filters: &[Filter]) -> Result<Element, ApiError> {
    filters
        .iter()
        .try_fold(Element::new("filters")?, |acc, filter| -> Result<Element, ApiError> {
            let entry = Element::new("filter")?
                .with_child(text_element("field", &filter.field)?)
                .with_child(text_element("operation", &filter.operation)?)
                .with_child(text_element("value", &filter.value)?);
            Ok(acc.with_child(entry))
        })
}

/// `<orders>` with one `<order><field/><type/></order>` per entry.
pub fn orders_element(orders: &[Order]) -> Result<Element, ApiError> {
    orders
        .iter()
        .try_fold(Element::new("orders")?, |acc, order| -> Result<Element, ApiError> {
            let entry = Element::new("order")?
                .with_child(text_element("field", &order.field)?)
                .with_child(text_element("type", &order.direction)?);
            Ok(acc.with_child(entry))
        })
}

/// `<limit><first/><number/></limit>`, or nothing at all without a limit.
pub fn limit_element(limit: Option<Limit>) -> Result<Option<Element>, ApiError> {
    let Some(limit) = limit else {
        return Ok(None);
    };
    let element = Element::new("limit")?
        .with_child(text_element("first", &limit.offset.to_string())?)
        .with_child(text_element("number", &limit.count.to_string())?);
    Ok(Some(element))
}

/// `<structure>` carrying optional `name` and `id` attributes.
pub fn structure_element(
    name: Option<&str>,
    id: Option<&str>,
    children: Vec<Element>,
) -> Result<Element, ApiError> {
    let mut structure = Element::new("structure")?;
    if let Some(name) = name {
        structure = structure.with_attr("name", name)?;
    }
    if let Some(id) = id {
        structure = structure.with_attr("id", id)?;
    }
    Ok(children.into_iter().fold(structure, Element::with_child))
}

/// Complete request document: declaration, `<request>`, and an `<action>`
/// of the given type wrapping `content`.
pub fn envelope(action: ActionType, content: Vec<Element>) -> Result<String, ApiError> {
    let action = content.into_iter().fold(
        Element::new("action")?
            .with_attr("type", action.as_str())?
            .with_attr("uid", PROTOCOL_UID)?,
        Element::with_child,
    );
    let request = Element::new("request")?.with_child(action);

    let mut writer = Writer::new(Vec::new());
    writer
        .write_event(Event::Decl(BytesDecl::from_start(BytesStart::from_content(
            DECLARATION,
            3,
        ))))
        .map_err(write_error)?;
    request.write(&mut writer)?;
    into_string(writer)
}

pub fn auth_request(login: &str, password: &str) -> Result<String, ApiError> {
    envelope(
        ActionType::Auth,
        vec![text_element("login", login)?, text_element("password", password)?],
    )
}

pub fn select_request(
    structure: &str,
    fields: &[Field],
    filters: &[Filter],
    limit: Option<Limit>,
    orders: &[Order],
) -> Result<String, ApiError> {
    let mut children = vec![
        fields_element(fields)?,
        filters_element(filters)?,
        orders_element(orders)?,
    ];
    children.extend(limit_element(limit)?);
    envelope(
        ActionType::List,
        vec![structure_element(Some(structure), None, children)?],
    )
}

pub fn add_request(structure: &str, fields: &[Field]) -> Result<String, ApiError> {
    envelope(
        ActionType::Add,
        vec![structure_element(Some(structure), None, vec![fields_element(fields)?])?],
    )
}

pub fn update_request(structure: &str, fields: &[Field], filters: &[Filter]) -> Result<String, ApiError> {
    let children = vec![fields_element(fields)?, filters_element(filters)?];
    envelope(
        ActionType::Edit,
        vec![structure_element(Some(structure), None, children)?],
    )
}

pub fn delete_request(structure: &str, id: &str) -> Result<String, ApiError> {
    envelope(
        ActionType::Wipe,
        vec![structure_element(Some(structure), Some(id), Vec::new())?],
    )
}

pub fn file_add_request(structure: &str, id: &str, fields: &[Field]) -> Result<String, ApiError> {
    envelope(
        ActionType::FileAdd,
        vec![structure_element(Some(structure), Some(id), vec![fields_element(fields)?])?],
    )
}

pub fn payment_calc_request(id: &str) -> Result<String, ApiError> {
    envelope(
        ActionType::PaymentCalc,
        vec![structure_element(None, Some(id), Vec::new())?],
    )
}

fn text_element(name: &str, text: &str) -> Result<Element, ApiError> {
    Element::new(name)?.with_text(text)
}

fn validate_name(name: &str) -> Result<(), ApiError> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) => is_name_start(first) && chars.all(is_name_char),
        None => false,
    };
    if !valid {
        return Err(ApiError::MalformedInput(format!(
            "`{name}` is not a valid XML element name"
        )));
    }
    Ok(())
}

/// XML 1.0 `NameStartChar`, without `:` since namespaces are not used.
fn is_name_start(c: char) -> bool {
    matches!(c,
        'A'..='Z'
        | '_'
        | 'a'..='z'
        | '\u{C0}'..='\u{D6}'
        | '\u{D8}'..='\u{F6}'
        | '\u{F8}'..='\u{2FF}'
        | '\u{370}'..='\u{37D}'
        | '\u{37F}'..='\u{1FFF}'
        | '\u{200C}'..='\u{200D}'
        | '\u{2070}'..='\u{218F}'
        | '\u{2C00}'..='\u{2FEF}'
        | '\u{3001}'..='\u{D7FF}'
        | '\u{F900}'..='\u{FDCF}'
        | '\u{FDF0}'..='\u{FFFD}'
        | '\u{10000}'..='\u{EFFFF}')
}

/// XML 1.0 `NameChar`.
fn is_name_char(c: char) -> bool {
    is_name_start(c)
        || matches!(c,
            '-' | '.' | '0'..='9' | '\u{B7}' | '\u{300}'..='\u{36F}' | '\u{203F}'..='\u{2040}')
}

/// Rejects characters outside the XML 1.0 `Char` production, which no
/// escaping can represent.
fn validate_chars(value: &str) -> Result<(), ApiError> {
    match value.chars().find(|&c| !is_xml_char(c)) {
        Some(c) => Err(ApiError::MalformedInput(format!(
            "character U+{:04X} cannot appear in XML",
            c as u32
        ))),
        None => Ok(()),
    }
}

fn is_xml_char(c: char) -> bool {
    matches!(c, '\t' | '\n' | '\r') || (c >= ' ' && c != '\u{FFFE}' && c != '\u{FFFF}')
}

fn write_error(err: impl std::fmt::Display) -> ApiError {
    ApiError::MalformedInput(format!("failed to write XML: {err}"))
}

fn into_string(writer: Writer<Vec<u8>>) -> Result<String, ApiError> {
    String::from_utf8(writer.into_inner())
        .map_err(|e| ApiError::MalformedInput(format!("serialized XML is not UTF-8: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::XmlDocument;

    #[test]
    fn fields_fragment_keeps_order_and_values() {
        let fields = vec![Field::bare("name"), Field::with_value("age", "42")];
        let xml = fields_element(&fields).unwrap().to_xml().unwrap();
        assert_eq!(xml, "<fields><name></name><age>42</age></fields>");
    }

    #[test]
    fn empty_fields_fragment_is_balanced() {
        let xml = fields_element(&[]).unwrap().to_xml().unwrap();
        assert_eq!(xml, "<fields></fields>");
    }

    #[test]
    fn fields_fragment_round_trips_through_parser() {
        let fields = vec![
            Field::with_value("title", "Tom & Jerry <\"cartoon\">"),
            Field::bare("phone"),
            Field::with_value("note", "it's"),
        ];
        let xml = fields_element(&fields).unwrap().to_xml().unwrap();
        let doc = XmlDocument::parse(&xml).unwrap();
        let parsed: Vec<(&str, &str)> = doc
            .root()
            .children()
            .iter()
            .map(|child| (child.name(), child.text()))
            .collect();
        assert_eq!(
            parsed,
            vec![
                ("title", "Tom & Jerry <\"cartoon\">"),
                ("phone", ""),
                ("note", "it's"),
            ]
        );
    }

    #[test]
    fn padded_values_round_trip_through_parser() {
        let fields = vec![
            Field::with_value("note", "  padded  "),
            Field::with_value("blank", " "),
            Field::with_value("memo", "line\n"),
        ];
        let xml = fields_element(&fields).unwrap().to_xml().unwrap();
        let doc = XmlDocument::parse(&xml).unwrap();
        let parsed: Vec<(&str, &str)> = doc
            .root()
            .children()
            .iter()
            .map(|child| (child.name(), child.text()))
            .collect();
        assert_eq!(
            parsed,
            vec![("note", "  padded  "), ("blank", " "), ("memo", "line\n")]
        );
    }

    #[test]
    fn name_ranges_beyond_latin_are_accepted() {
        for name in ["Ölfeld", "a·b", "x\u{301}", "_1.2-3"] {
            assert!(fields_element(&[Field::bare(name)]).is_ok(), "{name:?}");
        }
    }

    #[test]
    fn special_characters_are_escaped() {
        let fields = vec![Field::with_value("comment", "a<b & \"c\"")];
        let xml = fields_element(&fields).unwrap().to_xml().unwrap();
        assert_eq!(
            xml,
            "<fields><comment>a&lt;b &amp; &quot;c&quot;</comment></fields>"
        );
    }

    #[test]
    fn filters_fragment_emits_one_block_per_entry() {
        let filters = vec![Filter::new("age", ">", "18"), Filter::new("city", "=", "Omsk")];
        let xml = filters_element(&filters).unwrap().to_xml().unwrap();
        assert_eq!(
            xml,
            "<filters>\
             <filter><field>age</field><operation>&gt;</operation><value>18</value></filter>\
             <filter><field>city</field><operation>=</operation><value>Omsk</value></filter>\
             </filters>"
        );
    }

    #[test]
    fn orders_fragment_uses_type_element() {
        let orders = vec![Order::new("name", "asc")];
        let xml = orders_element(&orders).unwrap().to_xml().unwrap();
        assert_eq!(xml, "<orders><order><field>name</field><type>asc</type></order></orders>");
    }

    #[test]
    fn limit_fragment_absent_without_limit() {
        assert!(limit_element(None).unwrap().is_none());
    }

    #[test]
    fn limit_fragment_with_offset_and_count() {
        let xml = limit_element(Some(Limit::new(5, 10)))
            .unwrap()
            .unwrap()
            .to_xml()
            .unwrap();
        assert_eq!(xml, "<limit><first>5</first><number>10</number></limit>");
    }

    #[test]
    fn invalid_field_name_fails_fast() {
        for name in ["", "1st", "first name", "a<b", "x&y", "µg", "ªb", "a²", "x½", "ns:tag", "-x"] {
            let err = fields_element(&[Field::bare(name)]).unwrap_err();
            assert!(matches!(err, ApiError::MalformedInput(_)), "{name:?}");
        }
    }

    #[test]
    fn control_characters_are_rejected() {
        let err = fields_element(&[Field::with_value("note", "bell\u{7}")]).unwrap_err();
        assert!(matches!(err, ApiError::MalformedInput(_)));
    }

    #[test]
    fn tabs_and_newlines_are_allowed() {
        let xml = fields_element(&[Field::with_value("note", "a\tb\nc")])
            .unwrap()
            .to_xml()
            .unwrap();
        assert_eq!(xml, "<fields><note>a\tb\nc</note></fields>");
    }

    #[test]
    fn unicode_names_are_accepted() {
        let xml = fields_element(&[Field::with_value("имя", "Иван")])
            .unwrap()
            .to_xml()
            .unwrap();
        assert_eq!(xml, "<fields><имя>Иван</имя></fields>");
    }

    #[test]
    fn attribute_values_are_escaped() {
        let xml = structure_element(Some("o'brien & co"), Some("<1>"), Vec::new())
            .unwrap()
            .to_xml()
            .unwrap();
        assert_eq!(
            xml,
            "<structure name='o&apos;brien &amp; co' id='&lt;1&gt;'></structure>"
        );
    }

    #[test]
    fn auth_envelope() {
        let xml = auth_request("admin", "p&ss").unwrap();
        assert_eq!(
            xml,
            "<?xml version='1.0' encoding='utf8' ?>\
             <request><action type='auth' uid='80085'>\
             <login>admin</login><password>p&amp;ss</password>\
             </action></request>"
        );
    }

    #[test]
    fn select_envelope_orders_children() {
        let xml = select_request(
            "contacts",
            &[Field::bare("name")],
            &[Filter::new("age", ">", "18")],
            Some(Limit::new(0, 50)),
            &[Order::new("name", "desc")],
        )
        .unwrap();
        assert_eq!(
            xml,
            "<?xml version='1.0' encoding='utf8' ?>\
             <request><action type='list' uid='80085'>\
             <structure name='contacts'>\
             <fields><name></name></fields>\
             <filters><filter><field>age</field><operation>&gt;</operation><value>18</value></filter></filters>\
             <orders><order><field>name</field><type>desc</type></order></orders>\
             <limit><first>0</first><number>50</number></limit>\
             </structure></action></request>"
        );
    }

    #[test]
    fn select_without_limit_has_no_limit_element() {
        let xml = select_request("contacts", &[], &[], None, &[]).unwrap();
        assert!(!xml.contains("<limit>"));
        assert!(xml.contains("<structure name='contacts'><fields></fields><filters></filters><orders></orders></structure>"));
    }

    #[test]
    fn delete_envelope_has_no_body() {
        let xml = delete_request("contacts", "42").unwrap();
        assert!(xml.contains("<action type='wipe' uid='80085'><structure name='contacts' id='42'></structure></action>"));
    }

    #[test]
    fn file_add_envelope_carries_id_and_fields() {
        let xml = file_add_request("deals", "7", &[Field::with_value("url", "https://x/a?b=1&c=2")]).unwrap();
        assert!(xml.contains(
            "<action type='fileAdd' uid='80085'><structure name='deals' id='7'>\
             <fields><url>https://x/a?b=1&amp;c=2</url></fields></structure>"
        ));
    }

    #[test]
    fn payment_calc_envelope_has_only_id() {
        let xml = payment_calc_request("13").unwrap();
        assert!(xml.contains("<action type='paymentCalc' uid='80085'><structure id='13'></structure></action>"));
    }

    #[test]
    fn update_envelope_has_fields_and_filters() {
        let xml = update_request(
            "contacts",
            &[Field::with_value("city", "Tomsk")],
            &[Filter::new("id", "=", "42")],
        )
        .unwrap();
        assert!(xml.contains(
            "<action type='edit' uid='80085'><structure name='contacts'>\
             <fields><city>Tomsk</city></fields>\
             <filters><filter><field>id</field><operation>=</operation><value>42</value></filter></filters>\
             </structure>"
        ));
    }

    #[test]
    fn every_envelope_parses() {
        let envelopes = [
            auth_request("a'b", "<&>").unwrap(),
            select_request("c\"d", &[Field::with_value("x", "]]>")], &[], None, &[]).unwrap(),
            add_request("contacts", &[Field::with_value("name", "A & B")]).unwrap(),
            delete_request("contacts", "'").unwrap(),
        ];
        for xml in envelopes {
            let doc = XmlDocument::parse(&xml).unwrap();
            assert_eq!(doc.root().name(), "request");
        }
    }
}
