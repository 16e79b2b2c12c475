use std::collections::BTreeMap;

use smallvec::SmallVec;

use crate::gap::{Descriptor, Uuid16};

use super::{cccd, Handle, Io, Perms, Prop};

/// Attribute value source.
#[derive(Clone, Debug)]
pub enum Value {
    /// Fixed value served from the database.
    Static(Box<[u8]>),
    /// Value produced and consumed by an I/O callback.
    Io(Io),
    /// Client Characteristic Configuration descriptor of the characteristic
    /// value at the handle. Owned by the notification manager.
    Cccd(Handle),
}

/// Descriptor definition.
#[derive(Clone, Debug)]
pub struct DescriptorDef {
    pub handle: Handle,
    pub uuid: Uuid16,
    pub perms: Perms,
    pub value: Value,
}

/// Characteristic definition.
#[derive(Clone, Debug)]
pub struct CharacteristicDef {
    /// Characteristic declaration handle.
    pub handle: Handle,
    /// Characteristic value handle.
    pub value_handle: Handle,
    pub uuid: Uuid16,
    pub props: Prop,
    pub perms: Perms,
    pub value: Value,
    pub descriptors: SmallVec<[DescriptorDef; 2]>,
}

impl CharacteristicDef {
    /// Returns the CCCD handle, if any.
    #[must_use]
    pub fn cccd(&self) -> Option<Handle> {
        (self.descriptors.iter())
            .find(|d| d.uuid == Descriptor::ClientCharacteristicConfiguration)
            .map(|d| d.handle)
    }
}

/// Primary service definition passed to the platform for registration.
#[derive(Clone, Debug)]
pub struct ServiceDef {
    pub handle: Handle,
    pub uuid: Uuid16,
    pub characteristics: Vec<CharacteristicDef>,
}

/// Immutable attribute database. Built once and never modified after
/// registration; changing the structure requires a new database.
#[derive(Clone, Debug, Default)]
pub struct Db {
    services: Vec<ServiceDef>,
    /// Attribute handle to (properties, value).
    attr: BTreeMap<Handle, Attr>,
}

/// Attribute entry used for request dispatch.
#[derive(Clone, Debug)]
pub(crate) struct Attr {
    pub props: Prop,
    pub value: Value,
}

impl Db {
    /// Creates a new database builder.
    #[inline]
    #[must_use]
    pub fn build() -> Builder {
        Builder {
            db: Self::default(),
            next: Some(Handle::MIN),
        }
    }

    /// Returns the service definitions in handle order.
    #[inline(always)]
    #[must_use]
    pub fn services(&self) -> &[ServiceDef] {
        &self.services
    }

    /// Returns the attribute entry for the specified handle.
    #[inline]
    pub(crate) fn get(&self, hdl: Handle) -> Option<&Attr> {
        self.attr.get(&hdl)
    }

    /// Returns the characteristic with the specified value handle.
    #[must_use]
    pub fn characteristic(&self, value_handle: Handle) -> Option<&CharacteristicDef> {
        (self.services.iter().flat_map(|s| s.characteristics.iter()))
            .find(|c| c.value_handle == value_handle)
    }

    /// Returns all characteristics with the specified UUID.
    pub fn characteristics(
        &self,
        uuid: impl Into<Uuid16>,
    ) -> impl Iterator<Item = &CharacteristicDef> {
        let uuid = uuid.into();
        (self.services.iter())
            .flat_map(|s| s.characteristics.iter())
            .filter(move |c| c.uuid == uuid)
    }
}

/// Database builder used to define services, characteristics, and
/// descriptors. Handles are assigned sequentially in definition order.
#[derive(Debug)]
pub struct Builder {
    db: Db,
    next: Option<Handle>,
}

impl Builder {
    /// Returns the final read-only database.
    #[inline]
    #[must_use]
    pub fn freeze(self) -> Db {
        self.db
    }

    /// Defines a primary service ([Vol 3] Part G, Section 3.1) and returns its
    /// declaration handle along with the value returned by `chars`.
    ///
    /// # Panics
    ///
    /// Panics if the handle space is exhausted.
    pub fn primary_service<T>(
        &mut self,
        uuid: impl Into<Uuid16>,
        chars: impl FnOnce(&mut ServiceBuilder) -> T,
    ) -> (Handle, T) {
        let handle = self.alloc();
        let mut sb = ServiceBuilder {
            b: self,
            chars: Vec::new(),
        };
        let r = chars(&mut sb);
        let characteristics = sb.chars;
        self.db.services.push(ServiceDef {
            handle,
            uuid: uuid.into(),
            characteristics,
        });
        (handle, r)
    }

    /// Allocates the next handle.
    fn alloc(&mut self) -> Handle {
        let h = self.next.expect("attribute handle space exhausted");
        self.next = h.next();
        h
    }
}

/// Builder of the characteristics of one service.
#[derive(Debug)]
pub struct ServiceBuilder<'a> {
    b: &'a mut Builder,
    chars: Vec<CharacteristicDef>,
}

impl ServiceBuilder<'_> {
    /// Defines a read-only characteristic with a static value and returns its
    /// value handle.
    pub fn ro_characteristic(
        &mut self,
        uuid: impl Into<Uuid16>,
        perms: Perms,
        val: impl AsRef<[u8]>,
    ) -> Handle {
        let v = Value::Static(val.as_ref().into());
        self.characteristic(uuid, Prop::READ, perms, v, |_| {})
    }

    /// Defines a characteristic ([Vol 3] Part G, Section 3.3) and returns its
    /// value handle. `descs` is called to define any descriptors.
    pub fn characteristic(
        &mut self,
        uuid: impl Into<Uuid16>,
        props: Prop,
        perms: Perms,
        value: impl Into<Value>,
        descs: impl FnOnce(&mut CharacteristicBuilder),
    ) -> Handle {
        let (uuid, value) = (uuid.into(), value.into());
        let handle = self.b.alloc();
        let value_handle = self.b.alloc();
        self.b.db.attr.insert(
            value_handle,
            Attr {
                props,
                value: value.clone(),
            },
        );
        let mut cb = CharacteristicBuilder {
            b: self.b,
            value_handle,
            descs: SmallVec::new(),
        };
        descs(&mut cb);
        let descriptors = cb.descs;
        self.chars.push(CharacteristicDef {
            handle,
            value_handle,
            uuid,
            props,
            perms,
            value,
            descriptors,
        });
        value_handle
    }
}

/// Builder of the descriptors of one characteristic.
#[derive(Debug)]
pub struct CharacteristicBuilder<'a> {
    b: &'a mut Builder,
    value_handle: Handle,
    descs: SmallVec<[DescriptorDef; 2]>,
}

impl CharacteristicBuilder<'_> {
    /// Defines a Client Characteristic Configuration descriptor
    /// ([Vol 3] Part G, Section 3.3.3.3).
    pub fn cccd(&mut self, perms: Perms) -> Handle {
        let v = Value::Cccd(self.value_handle);
        self.descriptor(Descriptor::ClientCharacteristicConfiguration, perms, v)
    }

    /// Defines a read-only descriptor with a static value.
    pub fn ro_descriptor(
        &mut self,
        uuid: impl Into<Uuid16>,
        perms: Perms,
        val: impl AsRef<[u8]>,
    ) -> Handle {
        self.descriptor(uuid, perms, Value::Static(val.as_ref().into()))
    }

    /// Defines a descriptor ([Vol 3] Part G, Section 3.3.3).
    fn descriptor(&mut self, uuid: impl Into<Uuid16>, perms: Perms, value: Value) -> Handle {
        let (uuid, handle) = (uuid.into(), self.b.alloc());
        let props = match value {
            Value::Cccd(_) => Prop::READ | Prop::WRITE,
            _ => Prop::READ,
        };
        self.b.db.attr.insert(
            handle,
            Attr {
                props,
                value: value.clone(),
            },
        );
        self.descs.push(DescriptorDef {
            handle,
            uuid,
            perms,
            value,
        });
        handle
    }
}

impl From<Io> for Value {
    #[inline(always)]
    fn from(io: Io) -> Self {
        Self::Io(io)
    }
}

impl Value {
    /// Returns the initial value reported to the platform at registration.
    #[must_use]
    pub fn initial(&self) -> &[u8] {
        match *self {
            Self::Static(ref v) => v,
            Self::Cccd(_) => &cccd::DISABLE,
            Self::Io(_) => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::gap::{Characteristic, Service};
    use crate::gatt::{IoReq, ReadReq};

    use super::*;

    #[test]
    fn handles() {
        let mut b = Db::build();
        let (svc, (a, c)) = b.primary_service(Service::Battery, |s| {
            let a = s.ro_characteristic(Characteristic::BatteryLevel, Perms::READ, [100]);
            let io = Io::from(|req: IoReq| match req {
                IoReq::Read(r) => r.complete([1, 2]),
                IoReq::Write(w) => w.update([0_u8; 2]),
            });
            let c = s.characteristic(
                Characteristic::Report,
                Prop::READ | Prop::NOTIFY,
                Perms::READ,
                io,
                |d| {
                    d.cccd(Perms::rw(false));
                    d.ro_descriptor(Descriptor::ReportReference, Perms::READ, [1, 1]);
                },
            );
            (a, c)
        });
        let db = b.freeze();
        let h = |v| Handle::new(v).unwrap();
        assert_eq!((svc, a, c), (h(1), h(3), h(5)));

        let s = &db.services()[0];
        assert_eq!(s.uuid, Service::Battery);
        assert_eq!(s.characteristics.len(), 2);
        let ch = db.characteristic(c).unwrap();
        assert_eq!(ch.handle, h(4));
        assert_eq!(ch.cccd(), Some(h(6)));
        assert_eq!(ch.descriptors[1].handle, h(7));
        assert_eq!(db.characteristic(a).unwrap().cccd(), None);
        assert_eq!(db.characteristics(Characteristic::Report).count(), 1);

        assert!(matches!(db.get(h(6)).unwrap().value, Value::Cccd(v) if v == c));
        assert_eq!(db.get(a).unwrap().value.initial(), [100]);
        let Value::Io(ref io) = db.get(c).unwrap().value else {
            panic!("expected I/O value");
        };
        let mut r = ReadReq::new(c, 0);
        io.exec(IoReq::Read(&mut r)).unwrap();
        assert_eq!(r.into_value(), [1, 2]);
        assert!(db.get(h(2)).is_none());
    }
}
