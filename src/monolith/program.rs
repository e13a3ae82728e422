//! Program description decoding
//!
//! The monolith's compressed block inflates to an XML document describing the
//! program: zones (one per recording), the AHDSR release time and the reverb
//! send parameters. Values live in attribute pairs (`<V name="..."
//! value="..."/>`), so a minimal attribute DOM over `quick-xml` events is all
//! the structure the decoder needs.

use crate::{Result, SynthFsError};
use quick_xml::events::Event;
use quick_xml::Reader;

/// Release time in device samples when no AHDSR envelope is present
pub const DEFAULT_RELEASE: u32 = 36_000; // 0.75s at 48kHz

/// One XML element: name, attributes and child elements (text is ignored)
#[derive(Debug, Clone, Default)]
pub struct XmlNode {
    /// Element name
    pub name: String,
    attrs: Vec<(String, String)>,
    /// Child elements in document order
    pub children: Vec<XmlNode>,
}

impl XmlNode {
    /// Parse a document and return its root element
    pub fn parse(data: &[u8]) -> Result<XmlNode> {
        let mut reader = Reader::from_reader(data);
        reader.config_mut().trim_text(true);

        let mut stack: Vec<XmlNode> = vec![XmlNode::default()];
        let mut buf = Vec::new();

        loop {
            let event = reader
                .read_event_into(&mut buf)
                .map_err(|e| SynthFsError::Format(format!("malformed program XML: {e}")))?;

            match event {
                Event::Start(ref e) => {
                    stack.push(Self::from_tag(e)?);
                }
                Event::Empty(ref e) => {
                    let node = Self::from_tag(e)?;
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(node),
                        None => return Err(SynthFsError::Format("unbalanced program XML".into())),
                    }
                }
                Event::End(_) => {
                    let node = stack
                        .pop()
                        .ok_or_else(|| SynthFsError::Format("unbalanced program XML".into()))?;
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(node),
                        None => return Err(SynthFsError::Format("unbalanced program XML".into())),
                    }
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        if stack.len() != 1 {
            return Err(SynthFsError::Format("unterminated element in program XML".into()));
        }

        stack
            .pop()
            .and_then(|wrapper| wrapper.children.into_iter().next())
            .ok_or_else(|| SynthFsError::Format("program XML has no root element".into()))
    }

    fn from_tag(e: &quick_xml::events::BytesStart) -> Result<XmlNode> {
        let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
        let mut attrs = Vec::new();
        for attr in e.attributes() {
            let attr =
                attr.map_err(|e| SynthFsError::Format(format!("malformed XML attribute: {e}")))?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr
                .unescape_value()
                .map_err(|e| SynthFsError::Format(format!("malformed XML attribute: {e}")))?
                .into_owned();
            attrs.push((key, value));
        }
        Ok(XmlNode {
            name,
            attrs,
            children: Vec::new(),
        })
    }

    /// Attribute value by name
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// First child element with the given element name
    pub fn child(&self, name: &str) -> Option<&XmlNode> {
        self.children.iter().find(|c| c.name == name)
    }

    /// First child element whose attribute `attr` equals `value`
    pub fn find_by_attr(&self, attr: &str, value: &str) -> Option<&XmlNode> {
        self.children.iter().find(|c| c.attr(attr) == Some(value))
    }

    /// `value` attribute of the child carrying `name="{key}"`
    pub fn value_of(&self, key: &str) -> Option<&str> {
        self.find_by_attr("name", key)?.attr("value")
    }
}

fn parsed<T: std::str::FromStr>(node: &XmlNode, key: &str, context: &str) -> Result<T> {
    node.value_of(key)
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| SynthFsError::Config(format!("{context}: missing or invalid '{key}'")))
}

/// Reverb send parameters of the program
#[derive(Debug, Clone, Copy, Default)]
pub struct ReverbSend {
    /// Whether a reverb send effect is present
    pub enabled: bool,
    /// Pre-delay
    pub pre_delay: f32,
    /// Room size
    pub room_size: f32,
    /// Color
    pub color: f32,
    /// Filter
    pub filter: f32,
}

/// One zone: a recording bound to a root semitone and a velocity bound
#[derive(Debug, Clone, Copy)]
pub struct ZoneInfo {
    /// Root semitone of the zone
    pub root_key: u8,
    /// Upper velocity bound in the source 0–127 domain
    pub high_velocity: u8,
    /// Index of the referenced audio chunk, in container discovery order
    pub sample_index: usize,
    /// Native sample rate of the referenced recording
    pub sample_rate: u32,
    /// Loop region (start, length) in native-rate samples
    pub loop_region: Option<(u32, u32)>,
}

/// Decoded program description
#[derive(Debug, Clone)]
pub struct ProgramDescription {
    /// Program name with any library prefix (up to the first `-`) stripped
    pub name: String,
    /// Release time in device samples
    pub release: u32,
    /// Reverb send parameters
    pub reverb: ReverbSend,
    /// Whether any zone declares a loop region
    pub looping: bool,
    /// All zones in document order
    pub zones: Vec<ZoneInfo>,
}

impl ProgramDescription {
    /// Decode the first program of a parsed document
    pub fn from_xml(root: &XmlNode) -> Result<Self> {
        let program = root
            .child("Programs")
            .and_then(|p| p.children.first())
            .ok_or_else(|| SynthFsError::Config("program description has no Programs entry".into()))?;

        let mut name = program.attr("name").unwrap_or_default().to_string();
        if let Some(idx) = name.find('-') {
            name = name[idx + 1..].to_string();
        }

        let release = Self::decode_release(program);
        let reverb = Self::decode_reverb(program);

        let mut zones = Vec::new();
        if let Some(zone_list) = program.child("Zones") {
            for zone in &zone_list.children {
                zones.push(Self::decode_zone(zone)?);
            }
        }
        let looping = zones.iter().any(|z| z.loop_region.is_some());

        Ok(Self {
            name,
            release,
            reverb,
            looping,
            zones,
        })
    }

    fn decode_release(program: &XmlNode) -> u32 {
        let envelope = program
            .child("Groups")
            .and_then(|g| g.children.first())
            .and_then(|group| group.child("IntModulators"))
            .and_then(|m| m.children.first())
            .and_then(|m| {
                m.children
                    .iter()
                    .find(|c| c.name == "Envelope" && c.attr("type") == Some("ahdsr"))
            });

        let Some(envelope) = envelope else {
            return DEFAULT_RELEASE;
        };

        // Release is authored in milliseconds; the device wants samples
        let millis = envelope
            .value_of("release")
            .and_then(|v| v.parse::<f32>().ok())
            .unwrap_or_default() as u32;
        if millis == 0 {
            return DEFAULT_RELEASE;
        }

        48_000_000 / millis
    }

    fn decode_reverb(program: &XmlNode) -> ReverbSend {
        let mut reverb = ReverbSend::default();

        let Some(send_fx) = program.child("ProgramSendFX") else {
            return reverb;
        };

        for effect in &send_fx.children {
            let Some(inner) = effect.children.last() else {
                continue;
            };
            if inner.name != "Reverb" {
                continue;
            }

            let f = |key: &str| inner.value_of(key).and_then(|v| v.parse().ok()).unwrap_or(0.0);
            reverb = ReverbSend {
                enabled: true,
                pre_delay: f("preDelay"),
                room_size: f("roomsize"),
                color: f("color"),
                filter: f("filter"),
            };
        }

        reverb
    }

    fn decode_zone(zone: &XmlNode) -> Result<ZoneInfo> {
        let params = zone
            .child("Parameters")
            .ok_or_else(|| SynthFsError::Config("zone has no Parameters".into()))?;
        let sample = zone
            .child("Sample")
            .ok_or_else(|| SynthFsError::Config("zone has no Sample".into()))?;

        let loop_region = zone
            .child("Loops")
            .and_then(|loops| loops.children.first())
            .map(|l| -> Result<(u32, u32)> {
                Ok((parsed(l, "loopStart", "loop")?, parsed(l, "loopLength", "loop")?))
            })
            .transpose()?;

        Ok(ZoneInfo {
            root_key: parsed(params, "rootKey", "zone parameters")?,
            high_velocity: parsed(params, "highVelocity", "zone parameters")?,
            sample_index: parsed(sample, "uniqueID", "zone sample")?,
            sample_rate: parsed(sample, "sampleRate", "zone sample")?,
            loop_region,
        })
    }
}
