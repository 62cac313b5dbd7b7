mod records;
mod units;
mod xml;

pub use records::{parse_json_records, parse_xml_records, Record};
pub use units::{parse_unit_source, unit_name_from_path};
pub use xml::{parse_xml_document, XmlDocument, XmlElementNode, XmlNode};
