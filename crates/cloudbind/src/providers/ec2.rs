//! Amazon EC2 over the query protocol
//!
//! Requests are `GET https://ec2.{region}.amazonaws.com/?Action=...&Version=...`
//! signed with HMAC-SHA256 in the query string. Responses are XML in which
//! every list member is an `<item>`, so builders are keyed by the enclosing
//! element where `item` alone would be ambiguous.

use crate::binder::{Args, BindingDescriptor, BindingDescriptorBuilder};
use crate::cache::InvalidatingCache;
use crate::context::{Operation, OperationTable, OptionalExt, Provider, ProviderContext};
use crate::error::{AuthError, ErrorKind, ParseError, Result};
use crate::filter::{Clock, FilterChain, HmacSigner, TimestampFilter, TimestampFormat};
use crate::mapper::{ErrorMapper, Fault, FaultParser};
use crate::parser::{DefaultFactory, DomainValue, ElementBuilder, Slot, XmlParser, parse_xml};
use http::Method;
use std::collections::BTreeMap;
use std::sync::Arc;

/// `DescribeImages`, args: `region`, `imageIds`, `owners`.
pub const DESCRIBE_IMAGES: &str = "describeImagesInRegion";
/// `DescribeReservedInstancesOfferings`, args: `region`, `offeringIds`,
/// `instanceType`, `availabilityZone`, `productDescription`.
pub const DESCRIBE_RESERVED_OFFERINGS: &str = "describeReservedInstancesOfferingsInRegion";
/// `DeregisterImage`, args: `region`, `imageId`.
pub const DEREGISTER_IMAGE: &str = "deregisterImageInRegion";

/// Header carrying the request time; covered by the signature.
pub const DATE_HEADER: &str = "x-amz-date";

/// EC2 provider.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ec2;

impl Ec2 {
    /// Provider id.
    pub const ID: &'static str = "ec2";
}

fn action(name: &str, verb: &str) -> BindingDescriptorBuilder {
    BindingDescriptor::builder(name, Method::GET, "/")
        .path_host("region")
        .const_query("Action", verb)
        .version_query("Version")
}

impl Provider for Ec2 {
    fn id(&self) -> &'static str {
        Self::ID
    }

    fn endpoint(&self) -> &str {
        "https://ec2.{region}.amazonaws.com"
    }

    fn api_version(&self) -> &str {
        "2011-05-15"
    }

    fn operations(&self) -> Result<OperationTable> {
        let describe_images = action(DESCRIBE_IMAGES, "DescribeImages")
            .query("imageIds", "ImageId")
            .query("owners", "Owner")
            .build()?;
        let describe_offerings = action(DESCRIBE_RESERVED_OFFERINGS, "DescribeReservedInstancesOfferings")
            .query("offeringIds", "ReservedInstancesOfferingId")
            .query("instanceType", "InstanceType")
            .query("availabilityZone", "AvailabilityZone")
            .query("productDescription", "ProductDescription")
            .build()?;
        let deregister = action(DEREGISTER_IMAGE, "DeregisterImage")
            .required_query("imageId", "ImageId")
            .build()?;

        Ok(OperationTable::new()
            .with(Operation::new(
                describe_images,
                XmlParser::of::<DescribeImagesBuilder>("DescribeImagesResponse"),
            ))?
            .with(Operation::new(
                describe_offerings,
                XmlParser::of::<ReservedOfferingsBuilder>("DescribeReservedInstancesOfferingsResponse"),
            ))?
            .with(Operation::new(
                deregister,
                XmlParser::of::<ReturnBuilder>("DeregisterImageResponse"),
            ))?)
    }

    fn filters(&self, clock: Arc<dyn Clock>) -> std::result::Result<FilterChain, AuthError> {
        let signer = HmacSigner::query(DATE_HEADER, "Signature", "AWSAccessKeyId")
            .with_signed_param("SignatureMethod", "HmacSHA256")
            .with_signed_param("SignatureVersion", "2");
        FilterChain::new(
            vec![
                Arc::new(TimestampFilter::new(DATE_HEADER, TimestampFormat::Iso8601, clock)),
                Arc::new(signer),
            ],
            Some(HmacSigner::ID),
        )
    }

    fn error_mapper(&self) -> ErrorMapper {
        ErrorMapper::new()
            .code_suffix(".NotFound", ErrorKind::NotFound)
            .code("AuthFailure", ErrorKind::Unauthorized)
            .code("UnauthorizedOperation", ErrorKind::Unauthorized)
            .code("RequestLimitExceeded", ErrorKind::RateLimited)
            .code("IncorrectState", ErrorKind::Conflict)
            .code_suffix(".Duplicate", ErrorKind::Conflict)
            .with_fault_parser(Arc::new(Ec2FaultParser))
    }
}

/// A block device attached to an image.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct BlockDevice {
    /// e.g. `/dev/sda1`
    pub device_name: String,
    /// EBS snapshot backing the device
    pub snapshot_id: Option<String>,
    /// Volume size in GiB
    pub volume_size: Option<u32>,
    /// Whether the volume goes away with the instance
    pub delete_on_termination: bool,
}

/// A machine image.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Image {
    /// `ami-...`
    pub id: String,
    /// Manifest location
    pub location: Option<String>,
    /// `available`, `pending`, `failed`
    pub state: Option<String>,
    /// Owner account id
    pub owner_id: Option<String>,
    /// Launchable by anyone
    pub is_public: bool,
    /// `i386`, `x86_64`
    pub architecture: Option<String>,
    /// `machine`, `kernel`, `ramdisk`
    pub image_type: Option<String>,
    /// Default kernel
    pub kernel_id: Option<String>,
    /// Default ramdisk
    pub ramdisk_id: Option<String>,
    /// Image name
    pub name: Option<String>,
    /// Free-form description
    pub description: Option<String>,
    /// `ebs` or `instance-store`
    pub root_device_type: Option<String>,
    /// Root device
    pub root_device_name: Option<String>,
    /// `paravirtual` or `hvm`
    pub virtualization_type: Option<String>,
    /// Marketplace product codes
    pub product_codes: Vec<String>,
    /// Block device mappings
    pub block_devices: Vec<BlockDevice>,
    /// Tags
    pub tags: BTreeMap<String, String>,
}

/// A reserved-instance offering.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReservedInstancesOffering {
    /// Offering id
    pub id: String,
    /// Instance type, e.g. `m1.small`
    pub instance_type: String,
    /// Availability zone
    pub availability_zone: String,
    /// Term in seconds
    pub duration: i64,
    /// Up-front price
    pub fixed_price: f64,
    /// Hourly price
    pub usage_price: f64,
    /// e.g. `Linux/UNIX`
    pub product_description: String,
}

fn some(text: &str) -> Option<String> {
    (!text.is_empty()).then(|| text.to_string())
}

fn number<T>(field: &str, text: &str) -> std::result::Result<T, ParseError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    text.parse().map_err(|e: T::Err| ParseError::InvalidValue {
        field: field.to_string(),
        reason: e.to_string(),
    })
}

#[derive(Default)]
struct BlockDeviceBuilder {
    device: BlockDevice,
}

impl ElementBuilder for BlockDeviceBuilder {
    fn end_element(&mut self, name: &str, text: &str) -> std::result::Result<(), ParseError> {
        match name {
            "deviceName" => self.device.device_name = text.to_string(),
            "snapshotId" => self.device.snapshot_id = some(text),
            "volumeSize" => self.device.volume_size = Some(number(name, text)?),
            "deleteOnTermination" => self.device.delete_on_termination = text == "true",
            _ => {}
        }
        Ok(())
    }

    fn finish(&mut self) -> std::result::Result<DomainValue, ParseError> {
        Ok(DomainValue::new(self.device.clone()))
    }

    fn reset(&mut self) {
        self.device = BlockDevice::default();
    }
}

struct BlockDeviceMappingBuilder {
    devices: Slot<BlockDevice>,
}

impl Default for BlockDeviceMappingBuilder {
    fn default() -> Self {
        Self { devices: Slot::list() }
    }
}

impl ElementBuilder for BlockDeviceMappingBuilder {
    fn child_builder(&self, name: &str) -> Option<Box<dyn ElementBuilder>> {
        (name == "item").then(|| Box::new(BlockDeviceBuilder::default()) as Box<dyn ElementBuilder>)
    }

    fn attach(&mut self, name: &str, value: DomainValue) -> std::result::Result<(), ParseError> {
        self.devices.put(value.into_field(name)?);
        Ok(())
    }

    fn finish(&mut self) -> std::result::Result<DomainValue, ParseError> {
        Ok(DomainValue::new(self.devices.take_all()))
    }

    fn reset(&mut self) {
        self.devices.clear();
    }
}

/// One `imagesSet/item`. `productCodes/item` and `tagSet/item` wrappers are
/// passed through; their leaves land here directly.
#[derive(Default)]
struct ImageBuilder {
    image: Image,
    tag_key: Option<String>,
}

impl ElementBuilder for ImageBuilder {
    fn child_builder(&self, name: &str) -> Option<Box<dyn ElementBuilder>> {
        (name == "blockDeviceMapping").then(|| Box::new(BlockDeviceMappingBuilder::default()) as Box<dyn ElementBuilder>)
    }

    fn end_element(&mut self, name: &str, text: &str) -> std::result::Result<(), ParseError> {
        let image = &mut self.image;
        match name {
            "imageId" => image.id = text.to_string(),
            "imageLocation" => image.location = some(text),
            "imageState" => image.state = some(text),
            "imageOwnerId" => image.owner_id = some(text),
            "isPublic" => image.is_public = text == "true",
            "architecture" => image.architecture = some(text),
            "imageType" => image.image_type = some(text),
            "kernelId" => image.kernel_id = some(text),
            "ramdiskId" => image.ramdisk_id = some(text),
            "name" => image.name = some(text),
            "description" => image.description = some(text),
            "rootDeviceType" => image.root_device_type = some(text),
            "rootDeviceName" => image.root_device_name = some(text),
            "virtualizationType" => image.virtualization_type = some(text),
            "productCode" => image.product_codes.push(text.to_string()),
            "key" => self.tag_key = Some(text.to_string()),
            "value" => {
                if let Some(key) = self.tag_key.take() {
                    image.tags.insert(key, text.to_string());
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn attach(&mut self, name: &str, value: DomainValue) -> std::result::Result<(), ParseError> {
        if name == "blockDeviceMapping" {
            self.image.block_devices = value.into_field(name)?;
        }
        Ok(())
    }

    fn finish(&mut self) -> std::result::Result<DomainValue, ParseError> {
        if self.image.id.is_empty() {
            return Err(ParseError::InvalidValue {
                field: "imageId".to_string(),
                reason: "missing".to_string(),
            });
        }
        Ok(DomainValue::new(self.image.clone()))
    }

    fn reset(&mut self) {
        self.image = Image::default();
        self.tag_key = None;
    }
}

/// `DescribeImagesResponse` -> `Vec<Image>`, duplicates dropped.
pub struct DescribeImagesBuilder {
    images: Slot<Image>,
}

impl Default for DescribeImagesBuilder {
    fn default() -> Self {
        Self { images: Slot::hashed_set() }
    }
}

impl ElementBuilder for DescribeImagesBuilder {
    fn child_builder(&self, name: &str) -> Option<Box<dyn ElementBuilder>> {
        (name == "item").then(|| Box::new(ImageBuilder::default()) as Box<dyn ElementBuilder>)
    }

    fn attach(&mut self, name: &str, value: DomainValue) -> std::result::Result<(), ParseError> {
        self.images.put(value.into_field(name)?);
        Ok(())
    }

    fn finish(&mut self) -> std::result::Result<DomainValue, ParseError> {
        Ok(DomainValue::new(self.images.take_all()))
    }

    fn reset(&mut self) {
        self.images.clear();
    }
}

#[derive(Default)]
struct OfferingBuilder {
    offering: ReservedInstancesOffering,
}

impl ElementBuilder for OfferingBuilder {
    fn end_element(&mut self, name: &str, text: &str) -> std::result::Result<(), ParseError> {
        let offering = &mut self.offering;
        match name {
            "reservedInstancesOfferingId" => offering.id = text.to_string(),
            "instanceType" => offering.instance_type = text.to_string(),
            "availabilityZone" => offering.availability_zone = text.to_string(),
            "duration" => offering.duration = number(name, text)?,
            "fixedPrice" => offering.fixed_price = number(name, text)?,
            "usagePrice" => offering.usage_price = number(name, text)?,
            "productDescription" => offering.product_description = text.to_string(),
            _ => {}
        }
        Ok(())
    }

    fn finish(&mut self) -> std::result::Result<DomainValue, ParseError> {
        Ok(DomainValue::new(self.offering.clone()))
    }

    fn reset(&mut self) {
        self.offering = ReservedInstancesOffering::default();
    }
}

/// `DescribeReservedInstancesOfferingsResponse` ->
/// `Vec<ReservedInstancesOffering>`, duplicates dropped.
pub struct ReservedOfferingsBuilder {
    offerings: Slot<ReservedInstancesOffering>,
}

impl Default for ReservedOfferingsBuilder {
    fn default() -> Self {
        Self { offerings: Slot::set() }
    }
}

impl ElementBuilder for ReservedOfferingsBuilder {
    fn child_builder(&self, name: &str) -> Option<Box<dyn ElementBuilder>> {
        (name == "item").then(|| Box::new(OfferingBuilder::default()) as Box<dyn ElementBuilder>)
    }

    fn attach(&mut self, name: &str, value: DomainValue) -> std::result::Result<(), ParseError> {
        self.offerings.put(value.into_field(name)?);
        Ok(())
    }

    fn finish(&mut self) -> std::result::Result<DomainValue, ParseError> {
        Ok(DomainValue::new(self.offerings.take_all()))
    }

    fn reset(&mut self) {
        self.offerings.clear();
    }
}

/// `<return>true</return>` -> `bool`.
#[derive(Default)]
pub struct ReturnBuilder {
    value: Slot<bool>,
}

impl ElementBuilder for ReturnBuilder {
    fn end_element(&mut self, name: &str, text: &str) -> std::result::Result<(), ParseError> {
        if name == "return" {
            self.value.put(text == "true");
        }
        Ok(())
    }

    fn finish(&mut self) -> std::result::Result<DomainValue, ParseError> {
        let value = self.value.take_one().ok_or_else(|| ParseError::InvalidValue {
            field: "return".to_string(),
            reason: "missing".to_string(),
        })?;
        Ok(DomainValue::new(value))
    }

    fn reset(&mut self) {
        self.value.clear();
    }
}

#[derive(Default)]
struct FaultBuilder {
    fault: Fault,
}

impl ElementBuilder for FaultBuilder {
    fn end_element(&mut self, name: &str, text: &str) -> std::result::Result<(), ParseError> {
        match name {
            // First error wins when several are reported.
            "Code" if self.fault.code.is_empty() => self.fault.code = text.to_string(),
            "Message" if self.fault.message.is_empty() => self.fault.message = text.to_string(),
            "RequestID" | "RequestId" => self.fault.request_id = some(text),
            _ => {}
        }
        Ok(())
    }

    fn finish(&mut self) -> std::result::Result<DomainValue, ParseError> {
        Ok(DomainValue::new(std::mem::take(&mut self.fault)))
    }

    fn reset(&mut self) {
        self.fault = Fault::default();
    }
}

/// `<Response><Errors><Error><Code>..</Code><Message>..</Message></Error></Errors><RequestID>..</RequestID></Response>`
#[derive(Debug, Clone, Copy, Default)]
pub struct Ec2FaultParser;

impl FaultParser for Ec2FaultParser {
    fn parse_fault(&self, body: &[u8]) -> Option<Fault> {
        let value = parse_xml(body, &DefaultFactory::<FaultBuilder>::new()).ok()?;
        let fault = value.downcast::<Fault>().ok()?;
        (!fault.code.is_empty()).then_some(fault)
    }
}

/// Cache key for per-region lookups.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegionAndName {
    /// Region, e.g. `us-east-1`
    pub region: String,
    /// Resource id or name within the region
    pub name: String,
}

impl RegionAndName {
    /// Create a key.
    pub fn new(region: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            name: name.into(),
        }
    }
}

/// Resolve one image by region and id.
///
/// A not-found fault and an empty result both yield `None`; a malformed
/// response is still an error.
pub async fn image_in_region(context: &ProviderContext, region: &str, id: &str) -> Result<Option<Image>> {
    let args = Args::new().with("region", region).with("imageIds", vec![id]);
    let images = context.call::<Vec<Image>>(DESCRIBE_IMAGES, &args).await.or_absent()?;
    Ok(images.and_then(|images| images.into_iter().find(|image| image.id == id)))
}

/// Image lookup by region and id, memoised until invalidated.
#[derive(Debug)]
pub struct RegionAndIdToImage {
    context: Arc<ProviderContext>,
    cache: InvalidatingCache<RegionAndName, Option<Image>>,
}

impl RegionAndIdToImage {
    /// Lookups through `context`.
    pub fn new(context: Arc<ProviderContext>) -> Self {
        Self {
            context,
            cache: InvalidatingCache::new(),
        }
    }

    /// Resolve an image; `None` when it does not exist.
    ///
    /// Absence is cached as well; [`invalidate`](Self::invalidate) forces a
    /// fresh lookup.
    pub async fn apply(&self, key: &RegionAndName) -> Result<Option<Image>> {
        self.cache
            .get_or_try_init(key, || image_in_region(&self.context, &key.region, &key.name))
            .await
    }

    /// Forget a cached lookup.
    pub fn invalidate(&self, key: &RegionAndName) -> bool {
        self.cache.invalidate(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binder::Binder;
    use crate::config::Credentials;
    use crate::filter::FixedClock;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;

    const IMAGES: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<DescribeImagesResponse xmlns="http://ec2.amazonaws.com/doc/2011-05-15/">
  <requestId>59dbff89-35bd-4eac-99ed-be587EXAMPLE</requestId>
  <imagesSet>
    <item>
      <imageId>ami-be3adfd7</imageId>
      <imageLocation>ec2-public-images/fedora-8-i386-base-v1.04.manifest.xml</imageLocation>
      <imageState>available</imageState>
      <imageOwnerId>206029621532</imageOwnerId>
      <isPublic>true</isPublic>
      <productCodes>
        <item><productCode>9961934F</productCode></item>
        <item><productCode>774F4FF8</productCode></item>
      </productCodes>
      <architecture>i386</architecture>
      <imageType>machine</imageType>
      <rootDeviceType>ebs</rootDeviceType>
      <rootDeviceName>/dev/sda1</rootDeviceName>
      <blockDeviceMapping>
        <item>
          <deviceName>/dev/sda1</deviceName>
          <ebs>
            <snapshotId>snap-32885f5a</snapshotId>
            <volumeSize>15</volumeSize>
            <deleteOnTermination>false</deleteOnTermination>
          </ebs>
        </item>
        <item>
          <deviceName>/dev/sdb</deviceName>
          <virtualName>ephemeral0</virtualName>
        </item>
      </blockDeviceMapping>
      <tagSet>
        <item><key>Name</key><value>web</value></item>
      </tagSet>
    </item>
    <item>
      <imageId>ami-4bb3d12e</imageId>
      <imageState>available</imageState>
      <isPublic>false</isPublic>
    </item>
    <item>
      <imageId>ami-4bb3d12e</imageId>
      <imageState>available</imageState>
      <isPublic>false</isPublic>
    </item>
  </imagesSet>
</DescribeImagesResponse>"#;

    #[test]
    fn test_describe_images() {
        let images = parse_xml(IMAGES.as_bytes(), &DefaultFactory::<DescribeImagesBuilder>::new())
            .unwrap()
            .downcast::<Vec<Image>>()
            .unwrap();

        assert_eq!(images.len(), 2);
        let first = &images[0];
        assert_eq!(first.id, "ami-be3adfd7");
        assert!(first.is_public);
        assert_eq!(first.product_codes, vec!["9961934F", "774F4FF8"]);
        assert_eq!(
            first.block_devices,
            vec![
                BlockDevice {
                    device_name: "/dev/sda1".into(),
                    snapshot_id: Some("snap-32885f5a".into()),
                    volume_size: Some(15),
                    delete_on_termination: false,
                },
                BlockDevice {
                    device_name: "/dev/sdb".into(),
                    ..Default::default()
                },
            ]
        );
        assert_eq!(first.tags.get("Name").map(String::as_str), Some("web"));

        let second = &images[1];
        assert_eq!(second.id, "ami-4bb3d12e");
        assert!(second.product_codes.is_empty());
        assert!(second.block_devices.is_empty());
        assert!(!second.is_public);
    }

    #[test]
    fn test_reserved_offerings() {
        let doc = r#"<DescribeReservedInstancesOfferingsResponse>
          <requestId>d072f652-cc57-458c-89e0-e6c02EXAMPLE</requestId>
          <reservedInstancesOfferingsSet>
            <item>
              <reservedInstancesOfferingId>649fd0c8-becc-4e1a-b5a6-31EXAMPLE</reservedInstancesOfferingId>
              <instanceType>m1.small</instanceType>
              <availabilityZone>us-east-1a</availabilityZone>
              <duration>31536000</duration>
              <fixedPrice>227.5</fixedPrice>
              <usagePrice>0.03</usagePrice>
              <productDescription>Linux/UNIX</productDescription>
            </item>
          </reservedInstancesOfferingsSet>
        </DescribeReservedInstancesOfferingsResponse>"#;

        let offerings = parse_xml(doc.as_bytes(), &DefaultFactory::<ReservedOfferingsBuilder>::new())
            .unwrap()
            .downcast::<Vec<ReservedInstancesOffering>>()
            .unwrap();
        assert_eq!(
            offerings,
            vec![ReservedInstancesOffering {
                id: "649fd0c8-becc-4e1a-b5a6-31EXAMPLE".into(),
                instance_type: "m1.small".into(),
                availability_zone: "us-east-1a".into(),
                duration: 31_536_000,
                fixed_price: 227.5,
                usage_price: 0.03,
                product_description: "Linux/UNIX".into(),
            }]
        );
    }

    #[test]
    fn test_bad_number_is_invalid_value() {
        let doc = "<R><set><item><duration>forever</duration></item></set></R>";
        let err = parse_xml(doc.as_bytes(), &DefaultFactory::<ReservedOfferingsBuilder>::new()).unwrap_err();
        assert!(matches!(err, ParseError::InvalidValue { field, .. } if field == "duration"));
    }

    #[test]
    fn test_deregister_return() {
        let doc = "<DeregisterImageResponse><requestId>r</requestId><return>true</return></DeregisterImageResponse>";
        let value = parse_xml(doc.as_bytes(), &DefaultFactory::<ReturnBuilder>::new()).unwrap();
        assert!(value.downcast::<bool>().unwrap());
    }

    #[test]
    fn test_fault_parser() {
        let body = br#"<Response><Errors><Error><Code>InvalidAMIID.NotFound</Code><Message>The AMI ID 'ami-1' does not exist</Message></Error></Errors><RequestID>req-9</RequestID></Response>"#;
        let fault = Ec2FaultParser.parse_fault(body).unwrap();
        assert_eq!(fault.code, "InvalidAMIID.NotFound");
        assert_eq!(fault.request_id.as_deref(), Some("req-9"));

        assert!(Ec2FaultParser.parse_fault(b"Service Unavailable").is_none());
        assert!(Ec2FaultParser.parse_fault(b"<Response></Response>").is_none());
    }

    #[test]
    fn test_error_mapper_codes() {
        let mapper = Ec2.error_mapper();
        let fault = |code: &str| {
            format!("<Response><Errors><Error><Code>{code}</Code><Message>m</Message></Error></Errors></Response>")
        };
        assert_eq!(mapper.classify_body(400, fault("InvalidAMIID.NotFound").as_bytes()).kind, ErrorKind::NotFound);
        assert_eq!(mapper.classify_body(400, fault("InvalidInstanceID.NotFound").as_bytes()).kind, ErrorKind::NotFound);
        assert_eq!(mapper.classify_body(401, fault("AuthFailure").as_bytes()).kind, ErrorKind::Unauthorized);
        let limited = mapper.classify_body(503, fault("RequestLimitExceeded").as_bytes());
        assert_eq!(limited.kind, ErrorKind::RateLimited);
        assert!(limited.retry_hint);
        assert_eq!(mapper.classify_body(400, fault("InvalidParameterValue").as_bytes()).kind, ErrorKind::Unknown);
    }

    #[test]
    fn test_describe_images_binding_and_signing() {
        let operations = Ec2.operations().unwrap();
        let binder = Binder::new(Ec2.endpoint(), Ec2.api_version());
        operations.validate(&binder).unwrap();

        let descriptor = operations.get(DESCRIBE_IMAGES).unwrap().descriptor();
        let args = Args::new().with("region", "us-east-1").with("imageIds", vec!["ami-1", "ami-2"]);
        let request = binder.bind(descriptor, &args).unwrap();
        assert_eq!(
            request.uri().as_str(),
            "https://ec2.us-east-1.amazonaws.com/?Action=DescribeImages&Version=2011-05-15&ImageId.1=ami-1&ImageId.2=ami-2"
        );

        let clock = Arc::new(FixedClock(Utc.with_ymd_and_hms(2011, 6, 1, 12, 0, 0).unwrap()));
        let chain = Ec2.filters(clock).unwrap();
        let signed = chain.apply(request, &Credentials::new("AKIDEXAMPLE", "secret")).unwrap();

        assert_eq!(signed.header(DATE_HEADER), Some("2011-06-01T12:00:00Z"));
        let pairs = signed.query_pairs();
        let get = |name: &str| pairs.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str());
        assert_eq!(get("AWSAccessKeyId"), Some("AKIDEXAMPLE"));
        assert_eq!(get("SignatureMethod"), Some("HmacSHA256"));
        assert_eq!(get("SignatureVersion"), Some("2"));
        assert!(get("Signature").is_some_and(|s| !s.is_empty()));
        assert_eq!(pairs.last().map(|(k, _)| k.as_str()), Some("Signature"));
    }

    #[test]
    fn test_deregister_requires_image_id() {
        let operations = Ec2.operations().unwrap();
        let binder = Binder::new(Ec2.endpoint(), Ec2.api_version());
        let descriptor = operations.get(DEREGISTER_IMAGE).unwrap().descriptor();
        let err = binder.bind(descriptor, &Args::new().with("region", "eu-west-1")).unwrap_err();
        assert_eq!(err, crate::error::BindingError::MissingArgument("imageId".into()));
    }
}
