//! XML element counting.

use std::collections::HashSet;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::analyzers::{AnalysisOutput, Analyzer, TestCase};

/// Counts every element of a well-formed XML document, root included.
///
/// Anything that is not a single well-formed document yields zero.
#[derive(Debug, Default)]
pub struct XMLElementCountAnalyzer;

impl Analyzer for XMLElementCountAnalyzer {
    fn describe(&self) -> &str {
        "Counts the elements in an XML document"
    }

    fn test_cases(&self) -> Vec<TestCase> {
        vec![
            TestCase::new("basic xml", "<root><child>test</child></root>", 2, None),
            TestCase::new(
                "declaration and empty elements",
                "<?xml version=\"1.0\"?>\n<!-- list -->\n<items>\n  <item id=\"1\"/>\n  <item id=\"2\"/>\n</items>\n",
                3,
                None,
            ),
            TestCase::new("unclosed element", "<unclosed", 0, None),
        ]
    }

    fn analyze(&self, text: &str) -> AnalysisOutput {
        match count_elements(text) {
            Some(count) => AnalysisOutput::count(count),
            None => AnalysisOutput::empty(),
        }
    }
}

fn check_attributes(e: &BytesStart, entities: &HashSet<String>) -> Option<()> {
    for attr in e.attributes() {
        attr.ok()?
            .unescape_value_with(|name| entities.contains(name).then_some(""))
            .ok()?;
    }
    Some(())
}

/// General entity names declared in a DOCTYPE internal subset.
fn declared_entities(doctype: &str) -> impl Iterator<Item = String> + '_ {
    doctype.split("<!ENTITY").skip(1).filter_map(|decl| {
        let name = decl.split_whitespace().next()?;
        (name != "%").then(|| name.to_string())
    })
}

/// Returns `None` for anything but one well-formed root element.
fn count_elements(text: &str) -> Option<i64> {
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut depth: u32 = 0;
    let mut count: i64 = 0;
    let mut seen_root = false;
    let mut entities = HashSet::new();

    loop {
        match reader.read_event_into(&mut buf).ok()? {
            Event::Start(ref e) => {
                if depth == 0 && seen_root {
                    return None;
                }
                check_attributes(e, &entities)?;
                seen_root = true;
                depth += 1;
                count += 1;
            }
            Event::Empty(ref e) => {
                if depth == 0 && seen_root {
                    return None;
                }
                check_attributes(e, &entities)?;
                seen_root = true;
                count += 1;
            }
            Event::End(_) => {
                depth = depth.checked_sub(1)?;
            }
            Event::DocType(ref e) => {
                entities.extend(declared_entities(&String::from_utf8_lossy(e)));
            }
            Event::Text(ref e) => {
                e.unescape_with(|name| entities.contains(name).then_some(""))
                    .ok()?;
                if depth == 0 {
                    return None;
                }
            }
            Event::CData(_) if depth == 0 => return None,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if depth != 0 || !seen_root {
        return None;
    }
    Some(count)
}
