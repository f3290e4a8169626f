//! Savvis Symphony VPDC
//!
//! vCloud-flavoured XML over basic authentication. Only the OVF network
//! section of a virtual data center is modelled.

use crate::binder::BindingDescriptor;
use crate::context::{Operation, OperationTable, Provider};
use crate::error::{AuthError, ErrorKind, ParseError, Result};
use crate::filter::{Clock, FilterChain, TokenFilter};
use crate::mapper::{ErrorMapper, Fault, FaultParser};
use crate::parser::{Attributes, DefaultFactory, DomainValue, ElementBuilder, Slot, XmlParser, parse_xml};
use http::Method;
use std::sync::Arc;

/// `GET /org/{billingSiteId}/vdc/{vpdcId}/networkSection`.
pub const GET_NETWORK_SECTION: &str = "getNetworkSection";

/// VPDC provider.
#[derive(Debug, Clone, Copy, Default)]
pub struct Vpdc;

impl Vpdc {
    /// Provider id.
    pub const ID: &'static str = "savvis-symphonyvpdc";
}

impl Provider for Vpdc {
    fn id(&self) -> &'static str {
        Self::ID
    }

    fn endpoint(&self) -> &str {
        "https://api.savvis.net/vpdc/v1.0"
    }

    fn api_version(&self) -> &str {
        "1.0"
    }

    fn operations(&self) -> Result<OperationTable> {
        let section = BindingDescriptor::builder(
            GET_NETWORK_SECTION,
            Method::GET,
            "/org/{billingSiteId}/vdc/{vpdcId}/networkSection",
        )
        .path("billingSiteId")
        .path("vpdcId")
        .const_header("Accept", "application/xml")
        .build()?;

        Ok(OperationTable::new().with(Operation::new(
            section,
            XmlParser::of::<NetworkSectionBuilder>("NetworkSection"),
        ))?)
    }

    fn filters(&self, _clock: Arc<dyn Clock>) -> std::result::Result<FilterChain, AuthError> {
        FilterChain::new(vec![Arc::new(TokenFilter::basic())], Some(TokenFilter::ID))
    }

    fn error_mapper(&self) -> ErrorMapper {
        ErrorMapper::new()
            .code("RESOURCE_NOT_FOUND", ErrorKind::NotFound)
            .code("ACCESS_TO_RESOURCE_IS_FORBIDDEN", ErrorKind::Unauthorized)
            .code("BUSY_ENTITY", ErrorKind::Conflict)
            .with_fault_parser(Arc::new(VpdcFaultParser))
    }
}

/// One logical network.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Network {
    /// `name` attribute
    pub name: String,
    /// `href` attribute, when the service links the network
    pub href: Option<String>,
    /// `Description` text
    pub description: Option<String>,
}

/// OVF `NetworkSection`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NetworkSection {
    /// `Info` text
    pub info: Option<String>,
    /// Networks in document order
    pub networks: Vec<Network>,
}

#[derive(Default)]
struct NetworkBuilder {
    network: Network,
}

impl ElementBuilder for NetworkBuilder {
    fn start_element(&mut self, name: &str, attributes: &Attributes) {
        if name == "Network" {
            self.network.name = attributes.get("name").unwrap_or_default().to_string();
            self.network.href = attributes.get("href").map(str::to_string);
        }
    }

    fn end_element(&mut self, name: &str, text: &str) -> std::result::Result<(), ParseError> {
        if name == "Description" && !text.is_empty() {
            self.network.description = Some(text.to_string());
        }
        Ok(())
    }

    fn finish(&mut self) -> std::result::Result<DomainValue, ParseError> {
        Ok(DomainValue::new(self.network.clone()))
    }

    fn reset(&mut self) {
        self.network = Network::default();
    }
}

/// `NetworkSection` -> [`NetworkSection`].
pub struct NetworkSectionBuilder {
    info: Slot<String>,
    networks: Slot<Network>,
}

impl Default for NetworkSectionBuilder {
    fn default() -> Self {
        Self {
            info: Slot::single(),
            networks: Slot::list(),
        }
    }
}

impl ElementBuilder for NetworkSectionBuilder {
    fn child_builder(&self, name: &str) -> Option<Box<dyn ElementBuilder>> {
        (name == "Network").then(|| Box::new(NetworkBuilder::default()) as Box<dyn ElementBuilder>)
    }

    fn end_element(&mut self, name: &str, text: &str) -> std::result::Result<(), ParseError> {
        if name == "Info" && !text.is_empty() {
            self.info.put(text.to_string());
        }
        Ok(())
    }

    fn attach(&mut self, name: &str, value: DomainValue) -> std::result::Result<(), ParseError> {
        self.networks.put(value.into_field(name)?);
        Ok(())
    }

    fn finish(&mut self) -> std::result::Result<DomainValue, ParseError> {
        Ok(DomainValue::new(NetworkSection {
            info: self.info.take_one(),
            networks: self.networks.take_all(),
        }))
    }

    fn reset(&mut self) {
        self.info.clear();
        self.networks.clear();
    }
}

#[derive(Default)]
struct ErrorBuilder {
    fault: Fault,
}

impl ElementBuilder for ErrorBuilder {
    fn start_element(&mut self, name: &str, attributes: &Attributes) {
        if name == "Error" {
            self.fault.code = attributes
                .get("minorErrorCode")
                .or_else(|| attributes.get("majorErrorCode"))
                .unwrap_or_default()
                .to_string();
            self.fault.message = attributes.get("message").unwrap_or_default().to_string();
        }
    }

    fn finish(&mut self) -> std::result::Result<DomainValue, ParseError> {
        Ok(DomainValue::new(std::mem::take(&mut self.fault)))
    }

    fn reset(&mut self) {
        self.fault = Fault::default();
    }
}

/// `<Error message="..." majorErrorCode="404" minorErrorCode="RESOURCE_NOT_FOUND"/>`
#[derive(Debug, Clone, Copy, Default)]
pub struct VpdcFaultParser;

impl FaultParser for VpdcFaultParser {
    fn parse_fault(&self, body: &[u8]) -> Option<Fault> {
        let fault = parse_xml(body, &DefaultFactory::<ErrorBuilder>::new())
            .ok()?
            .downcast::<Fault>()
            .ok()?;
        (!fault.code.is_empty()).then_some(fault)
    }
}
