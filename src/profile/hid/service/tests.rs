use crate::compat::Generic;
use crate::config::Classes;
use crate::gap::Uuid16;
use crate::gatt::{Db, NotifyParams, Server, Value};
use crate::host::mock::{central, MockPlatform};
use crate::le::Peer;

use super::*;

struct Fixture {
    hid: HidService,
    srv: Server,
}

fn fixture(cfg: &Config) -> Result<Fixture> {
    let p = MockPlatform::new();
    let n = Arc::new(Notifier::new(p.clone(), NotifyParams::default()));
    let mut b = Db::build();
    let hid = HidService::define(&mut b, cfg, &Generic, &n)?;
    let srv = Server::new(p, b.freeze(), n, hid.priming_handles());
    srv.open()?;
    assert!(srv.on_connect(Peer::new(central(1))));
    Ok(Fixture { hid, srv })
}

/// Returns the value handle of the only characteristic with `uuid`.
fn value_handle(db: &Db, uuid: Characteristic) -> Handle {
    let mut it = db.characteristics(uuid);
    let h = it.next().unwrap().value_handle;
    assert!(it.next().is_none());
    h
}

#[test]
fn layout() {
    let f = fixture(&Config::default()).unwrap();
    let db = f.srv.db();
    let svc = &db.services()[0];
    assert_eq!(svc.uuid, Service::HumanInterfaceDevice);
    let uuids: Vec<_> = svc.characteristics.iter().map(|c| c.uuid).collect();
    assert_eq!(
        uuids,
        [
            Characteristic::HidInformation,
            Characteristic::ReportMap,
            Characteristic::HidControlPoint,
            Characteristic::Report,
            Characteristic::Report,
            Characteristic::Report,
            Characteristic::Report,
        ]
        .map(Uuid16::from)
    );

    let refs: Vec<_> = (svc.characteristics.iter())
        .flat_map(|c| c.descriptors.iter())
        .filter(|d| d.uuid == Descriptor::ReportReference)
        .map(|d| d.value.initial().to_vec())
        .collect();
    assert_eq!(refs, [[1, 1], [2, 1], [2, 2], [3, 1]]);

    let cccds = (svc.characteristics.iter()).filter(|c| c.cccd().is_some()).count();
    assert_eq!(cccds, 3);

    let peer = central(1);
    let info = value_handle(db, Characteristic::HidInformation);
    assert_eq!(f.srv.read(peer, info, 0).unwrap(), HID_INFO);
    let map = value_handle(db, Characteristic::ReportMap);
    assert_eq!(f.srv.read(peer, map, 0).unwrap(), f.hid.report_map().as_ref());
    assert_eq!(
        f.hid.report_map().reports(),
        [
            ReportRef::input(1),
            ReportRef::input(2),
            ReportRef::output(2),
            ReportRef::input(3),
        ]
    );

    let m = f.hid.mouse().unwrap().handle();
    assert_eq!(f.srv.read(peer, m, 0).unwrap(), [1, 0, 0, 0, 0]);
    assert_eq!(f.hid.class_of(m), Some(Class::Mouse));
    assert_eq!(f.hid.class_of(map), None);
    assert_eq!(f.hid.priming_handles().len(), 2);
}

#[test]
fn encrypted_perms() {
    let mut cfg = Config::default();
    let f = fixture(&cfg).unwrap();
    let c = f.srv.db().characteristics(Characteristic::ReportMap).next().unwrap();
    assert_eq!(c.perms, Perms::READ_ENCRYPTED);

    cfg.encrypt = false;
    cfg.country_code = 0x21;
    let f = fixture(&cfg).unwrap();
    let c = f.srv.db().characteristics(Characteristic::HidInformation).next().unwrap();
    assert_eq!(c.perms, Perms::READ);
    assert!(matches!(c.value, Value::Static(ref v) if **v == [0x11, 0x01, 0x21, 0b10]));
}

#[test]
fn config_errors() {
    let mut cfg = Config::default();
    cfg.report_ids.media = 1;
    assert!(matches!(fixture(&cfg), Err(Error::Config(_))));

    cfg.classes = Classes {
        mouse: false,
        keyboard: false,
        media: false,
    };
    assert!(matches!(fixture(&cfg), Err(Error::Config(_))));
}

#[test]
fn single_class() {
    let mut cfg = Config::default();
    cfg.classes.mouse = false;
    cfg.classes.keyboard = false;
    let f = fixture(&cfg).unwrap();
    assert!(matches!(f.hid.mouse(), Err(Error::ClassDisabled(Class::Mouse))));
    assert!(matches!(f.hid.kbd(), Err(Error::ClassDisabled(Class::Keyboard))));
    assert!(f.hid.media().is_ok());
    assert!(f.hid.priming_handles().is_empty());
    assert_eq!(f.hid.report_map().reports(), [ReportRef::input(3)]);
    assert_eq!(f.hid.leds(), LedState::empty());
}

#[test]
fn control_point() {
    let f = fixture(&Config::default()).unwrap();
    let (peer, cp) = (central(1), value_handle(f.srv.db(), Characteristic::HidControlPoint));
    let mut rx = f.hid.subscribe();
    f.hid.set_connected(true);
    assert!(f.hid.state().is_connected());

    assert_eq!(f.srv.write(peer, cp, 0, &[SUSPEND]).unwrap(), None);
    assert!(f.hid.state().is_suspended());
    assert!(rx.has_changed().unwrap());
    rx.borrow_and_update();
    assert_eq!(f.srv.write(peer, cp, 0, &[0x7F]).unwrap(), None);
    assert!(f.hid.state().is_suspended());
    assert!(!rx.has_changed().unwrap());
    f.srv.write(peer, cp, 0, &[EXIT_SUSPEND]).unwrap();
    assert!(!f.hid.state().is_suspended());
    assert_eq!(f.srv.read(peer, cp, 0), Err(crate::gatt::ErrorCode::ReadNotPermitted));

    f.srv.write(peer, cp, 0, &[SUSPEND]).unwrap();
    f.hid.set_connected(false);
    assert_eq!(f.hid.state(), HidState::empty());
}

#[test]
fn leds() {
    let f = fixture(&Config::default()).unwrap();
    let peer = central(1);
    let out = (f.srv.db().characteristics(Characteristic::Report))
        .find(|c| c.props.contains(Prop::WRITE))
        .unwrap()
        .value_handle;
    let rx = f.hid.kbd().unwrap().subscribe_leds();

    f.srv.write(peer, out, 0, &[0b11]).unwrap();
    assert_eq!(f.hid.leds(), LedState::NUM_LOCK | LedState::CAPS_LOCK);
    assert_eq!(f.srv.read(peer, out, 0).unwrap(), [2, 0b11]);
    f.srv.write(peer, out, 0, &[2, 0b10]).unwrap();
    assert_eq!(*rx.borrow(), LedState::CAPS_LOCK);
    f.srv.write(peer, out, 0, &[]).unwrap();
    assert_eq!(f.hid.leds(), LedState::CAPS_LOCK);
    assert_eq!(f.srv.write(peer, out, 0, &[5, 0b01]), Ok(None));
    assert_eq!(f.hid.leds(), LedState::CAPS_LOCK);
    assert_eq!(f.srv.write(peer, out, 0, &[2, 0b01, 0]), Ok(None));
    assert_eq!(f.srv.write(peer, out, 0, &[1, 2, 3]), Ok(None));
    assert_eq!(*rx.borrow(), LedState::CAPS_LOCK);

    f.hid.set_connected(false);
    assert_eq!(f.hid.leds(), LedState::empty());
}

#[test]
fn readiness() {
    let f = fixture(&Config::default()).unwrap();
    f.hid.set_connected(true);
    f.hid.on_cccd(Class::Media, true);
    f.hid.on_cccd(Class::Mouse, true);
    assert!(f.hid.state().is_ready(Class::Media));
    assert!(!f.hid.state().is_ready(Class::Mouse));
    f.hid.set_ready(Class::Mouse, true);
    assert!(f.hid.state().is_ready(Class::Mouse));
    f.hid.on_cccd(Class::Mouse, false);
    assert!(!f.hid.state().is_ready(Class::Mouse));
    assert!(f.hid.state().is_active());
}
