use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::host::Platform;
use crate::le::{Addr, Peer};
use crate::{Error, Hex, Result, SyncMutex};

use super::*;

/// Default ATT MTU ([Vol 3] Part F, Section 3.2.8).
const DEFAULT_MTU: u16 = 23;

/// Server lifecycle state.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ServerState {
    #[default]
    Idle,
    Open,
    Advertising,
    Connected,
    Disconnected,
}

impl Display for ServerState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match *self {
            Self::Idle => "idle",
            Self::Open => "open",
            Self::Advertising => "advertising",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
        })
    }
}

/// Connected central.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Connection {
    pub peer: Peer,
    pub bonded: bool,
    pub mtu: u16,
}

/// Result of a CCCD write.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CccdWrite {
    /// Characteristic value handle.
    pub hdl: Handle,
    pub enable: bool,
    /// Whether the notification state changed.
    pub changed: bool,
}

/// GATT server serving one central at a time.
#[derive(Debug)]
pub struct Server {
    platform: Arc<dyn Platform>,
    db: Db,
    notifier: Arc<Notifier>,
    priming: BTreeSet<Handle>,
    st: SyncMutex<State>,
}

#[derive(Debug, Default)]
struct State {
    state: ServerState,
    conn: Option<Connection>,
}

impl Server {
    /// Creates a server for `db`. Enabling notifications on a characteristic
    /// in `priming` puts it into the [`CccdState::Priming`] state.
    pub fn new(
        platform: Arc<dyn Platform>,
        db: Db,
        notifier: Arc<Notifier>,
        priming: impl IntoIterator<Item = Handle>,
    ) -> Self {
        Self {
            platform,
            db,
            notifier,
            priming: priming.into_iter().collect(),
            st: SyncMutex::default(),
        }
    }

    /// Returns the attribute database.
    #[inline(always)]
    #[must_use]
    pub const fn db(&self) -> &Db {
        &self.db
    }

    /// Returns the current lifecycle state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> ServerState {
        self.st.lock().state
    }

    /// Returns the connected central.
    #[inline]
    #[must_use]
    pub fn connection(&self) -> Option<Connection> {
        self.st.lock().conn.clone()
    }

    /// Returns whether a central is connected.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.st.lock().conn.is_some()
    }

    /// Opens the platform server and registers all services.
    pub fn open(&self) -> Result<()> {
        let mut st = self.st.lock();
        if st.state != ServerState::Idle {
            return Err(Error::InvalidState("server already open"));
        }
        (self.platform.open_server()).map_err(|e| Error::Gatt {
            op: GattOp::OpenServer,
            reason: e.to_string(),
        })?;
        for svc in self.db.services() {
            if let Err(e) = self.platform.add_service(svc) {
                self.platform.close_server();
                return Err(Error::Gatt {
                    op: GattOp::AddService,
                    reason: format!("{}: {e}", svc.uuid),
                });
            }
            debug!("Registered {} at {}", svc.uuid, svc.handle);
        }
        st.state = ServerState::Open;
        info!("GATT server open with {} services", self.db.services().len());
        Ok(())
    }

    /// Disconnects the central and closes the platform server.
    pub fn close(&self) {
        let mut st = self.st.lock();
        if st.state == ServerState::Idle {
            return;
        }
        if let Some(c) = st.conn.take() {
            self.platform.disconnect(c.peer.addr);
        }
        self.notifier.reset();
        self.platform.close_server();
        st.state = ServerState::Idle;
        info!("GATT server closed");
    }

    /// Records the advertising state.
    pub fn set_advertising(&self, on: bool) {
        let mut st = self.st.lock();
        st.state = match (st.state, on) {
            (ServerState::Open | ServerState::Disconnected, true) => ServerState::Advertising,
            (ServerState::Advertising, false) => ServerState::Open,
            (s, _) => s,
        };
    }

    /// Accepts a new central. Any central connecting while another one is
    /// connected is disconnected. Returns whether the central was accepted.
    pub fn on_connect(&self, peer: Peer) -> bool {
        let mut st = self.st.lock();
        if st.state == ServerState::Idle {
            warn!("Connection from {peer} while the server is closed");
            self.platform.disconnect(peer.addr);
            return false;
        }
        match st.conn {
            Some(ref c) if c.peer.addr == peer.addr => return true,
            Some(ref c) => {
                warn!("Rejecting {peer}: {} is already connected", c.peer);
                self.platform.disconnect(peer.addr);
                return false;
            }
            None => {}
        }
        info!("Connected to {peer}");
        self.notifier.connect(peer.addr);
        st.conn = Some(Connection {
            peer,
            bonded: false,
            mtu: DEFAULT_MTU,
        });
        st.state = ServerState::Connected;
        true
    }

    /// Clears the connection if `addr` is the connected central. Returns
    /// whether the connection was cleared.
    pub fn on_disconnect(&self, addr: Addr) -> bool {
        let mut st = self.st.lock();
        match st.conn {
            Some(ref c) if c.peer.addr == addr => {
                info!("Disconnected from {}", c.peer);
                st.conn = None;
                st.state = ServerState::Disconnected;
                self.notifier.reset();
                true
            }
            _ => {
                debug!("Ignoring disconnect of {addr}");
                false
            }
        }
    }

    /// Updates the bond flag of the connected central.
    pub fn set_bonded(&self, addr: Addr, bonded: bool) {
        if let Some(c) = self.st.lock().conn.as_mut().filter(|c| c.peer.addr == addr) {
            c.bonded = bonded;
        }
    }

    /// Updates the ATT MTU of the connected central.
    pub fn set_mtu(&self, addr: Addr, mtu: u16) {
        if let Some(c) = self.st.lock().conn.as_mut().filter(|c| c.peer.addr == addr) {
            debug!("MTU for {addr}: {mtu}");
            c.mtu = mtu;
        }
    }

    /// Handles a read request.
    pub fn read(
        &self,
        peer: Addr,
        hdl: Handle,
        off: u16,
    ) -> std::result::Result<Vec<u8>, ErrorCode> {
        self.check_peer(peer, ErrorCode::ReadNotPermitted)?;
        let at = self.db.get(hdl).ok_or(ErrorCode::InvalidHandle)?;
        if !at.props.contains(Prop::READ) {
            return Err(ErrorCode::ReadNotPermitted);
        }
        let mut r = ReadReq::new(hdl, off);
        match at.value {
            Value::Static(ref v) => r.complete(v)?,
            Value::Cccd(ch) => r.complete(self.notifier.cccd_value(ch))?,
            Value::Io(ref io) => io.exec(IoReq::Read(&mut r))?,
        }
        Ok(r.into_value())
    }

    /// Handles a write request. CCCD writes update the notification state and
    /// are returned to the caller.
    pub fn write(
        &self,
        peer: Addr,
        hdl: Handle,
        off: u16,
        val: &[u8],
    ) -> std::result::Result<Option<CccdWrite>, ErrorCode> {
        self.check_peer(peer, ErrorCode::WriteNotPermitted)?;
        let at = self.db.get(hdl).ok_or(ErrorCode::InvalidHandle)?;
        match at.value {
            Value::Cccd(ch) => {
                if off != 0 {
                    return Err(ErrorCode::InvalidOffset);
                }
                let enable = match *val {
                    [a, b] if [a, b] == cccd::NOTIFY => true,
                    [a, b] if [a, b] == cccd::DISABLE => false,
                    [_, _] => {
                        warn!("Unsupported CCCD value for {ch}: {}", Hex(val));
                        return Err(ErrorCode::CccdImproperlyConfigured);
                    }
                    _ => return Err(ErrorCode::InvalidAttributeValueLength),
                };
                let changed = (self.notifier).set_cccd(ch, enable, self.priming.contains(&ch));
                Ok(Some(CccdWrite {
                    hdl: ch,
                    enable,
                    changed,
                }))
            }
            Value::Io(ref io) if at.props.intersects(Prop::WRITE | Prop::WRITE_CMD) => {
                io.exec(IoReq::Write(&WriteReq::new(hdl, off, val)))?;
                Ok(None)
            }
            _ => Err(ErrorCode::WriteNotPermitted),
        }
    }

    /// Sends a request response, logging any platform failure.
    pub fn respond(&self, peer: Addr, id: u32, rsp: std::result::Result<&[u8], ErrorCode>) {
        if let Err(ref e) = rsp {
            debug!("Request {id} from {peer} failed: {e}");
        }
        if let Err(e) = self.platform.send_response(peer, id, rsp) {
            warn!("Failed to respond to request {id} from {peer}: {e}");
        }
    }

    /// Refuses requests from anything other than the connected central.
    fn check_peer(&self, peer: Addr, err: ErrorCode) -> std::result::Result<(), ErrorCode> {
        match self.st.lock().conn {
            Some(ref c) if c.peer.addr == peer => Ok(()),
            _ => {
                warn!("Refusing request from {peer}");
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::gap::{Characteristic, Descriptor, Service};
    use crate::host::mock::{central, Call, MockPlatform};

    use super::*;

    struct Fixture {
        p: Arc<MockPlatform>,
        n: Arc<Notifier>,
        srv: Server,
        report: Handle,
        cccd: Handle,
        out: Handle,
        out_val: Arc<SyncMutex<[u8; 2]>>,
    }

    fn fixture() -> Fixture {
        let out = Arc::new(SyncMutex::new([3_u8, 0]));
        let mut b = Db::build();
        let (_, (report, cccd, out_hdl)) = b.primary_service(Service::HumanInterfaceDevice, |s| {
            s.ro_characteristic(Characteristic::HidInformation, Perms::READ, [0x11, 0x01, 0, 2]);
            let mut cccd = None;
            let report = s.characteristic(
                Characteristic::Report,
                Prop::READ | Prop::NOTIFY,
                Perms::READ,
                Value::Static([1, 0, 0].into()),
                |d| {
                    cccd = Some(d.cccd(Perms::rw(false)));
                    d.ro_descriptor(Descriptor::ReportReference, Perms::READ, [1, 1]);
                },
            );
            let io = Io::with(&out, |v, req| match req {
                IoReq::Read(r) => r.complete(*v.lock()),
                IoReq::Write(w) => w.update(&mut *v.lock()),
            });
            let out = s.characteristic(
                Characteristic::Report,
                Prop::READ | Prop::WRITE | Prop::WRITE_CMD,
                Perms::rw(false),
                io,
                |_| {},
            );
            (report, cccd.unwrap(), out)
        });
        b.primary_service(Service::Battery, |s| {
            s.ro_characteristic(Characteristic::BatteryLevel, Perms::READ, [100]);
        });
        let p = MockPlatform::new();
        let n = Arc::new(Notifier::new(p.clone(), NotifyParams::default()));
        let srv = Server::new(p.clone(), b.freeze(), Arc::clone(&n), [report]);
        Fixture {
            p,
            n,
            srv,
            report,
            cccd,
            out: out_hdl,
            out_val: out,
        }
    }

    #[test]
    fn lifecycle() {
        let f = fixture();
        assert!(!f.srv.on_connect(Peer::new(central(1))));
        f.srv.open().unwrap();
        assert!(f.srv.open().is_err());
        assert_eq!(
            f.p.calls(),
            [
                Call::Disconnect(central(1)),
                Call::OpenServer,
                Call::AddService(Service::HumanInterfaceDevice.into()),
                Call::AddService(Service::Battery.into()),
            ]
        );
        f.srv.set_advertising(true);
        assert_eq!(f.srv.state(), ServerState::Advertising);
        f.p.clear();

        assert!(f.srv.on_connect(Peer::new(central(1))));
        assert_eq!(f.srv.state(), ServerState::Connected);
        assert_eq!(f.n.peer(), Some(central(1)));
        assert!(!f.srv.on_connect(Peer::new(central(2))));
        assert_eq!(f.p.calls(), [Call::Disconnect(central(2))]);
        assert_eq!(f.srv.connection().unwrap().peer.addr, central(1));

        assert!(!f.srv.on_disconnect(central(2)));
        assert!(f.srv.on_disconnect(central(1)));
        assert_eq!(f.srv.state(), ServerState::Disconnected);
        assert_eq!(f.n.peer(), None);

        f.srv.close();
        assert_eq!(f.srv.state(), ServerState::Idle);
        assert_eq!(f.p.calls().last(), Some(&Call::CloseServer));
    }

    #[test]
    fn read() {
        let f = fixture();
        f.srv.open().unwrap();
        f.srv.on_connect(Peer::new(central(1)));
        let rd = |hdl: Handle, off| f.srv.read(central(1), hdl, off);
        let h = |v| Handle::new(v).unwrap();

        assert_eq!(rd(h(3), 0), Ok(vec![0x11, 0x01, 0, 2]));
        assert_eq!(rd(h(3), 2), Ok(vec![0, 2]));
        assert_eq!(rd(h(3), 5), Err(ErrorCode::InvalidOffset));
        assert_eq!(rd(h(2), 0), Err(ErrorCode::InvalidHandle));
        assert_eq!(rd(f.cccd, 0), Ok(cccd::DISABLE.to_vec()));
        assert_eq!(rd(f.report, 0), Ok(vec![1, 0, 0]));
        assert_eq!(
            f.srv.read(central(2), h(3), 0),
            Err(ErrorCode::ReadNotPermitted)
        );
    }

    #[test]
    fn write() {
        let f = fixture();
        f.srv.open().unwrap();
        f.srv.on_connect(Peer::new(central(1)));
        let wr = |hdl: Handle, v: &[u8]| f.srv.write(central(1), hdl, 0, v);

        assert_eq!(wr(f.cccd, &[1]), Err(ErrorCode::InvalidAttributeValueLength));
        assert_eq!(wr(f.cccd, &cccd::INDICATE), Err(ErrorCode::CccdImproperlyConfigured));
        assert_eq!(f.n.state(f.report), CccdState::Disabled);
        let w = wr(f.cccd, &cccd::NOTIFY).unwrap().unwrap();
        assert!(w.enable && w.changed && w.hdl == f.report);
        assert_eq!(f.n.state(f.report), CccdState::Priming);
        assert_eq!(f.srv.read(central(1), f.cccd, 0), Ok(cccd::NOTIFY.to_vec()));
        assert!(!wr(f.cccd, &cccd::NOTIFY).unwrap().unwrap().changed);

        assert_eq!(wr(f.report, &[1]), Err(ErrorCode::WriteNotPermitted));
        assert_eq!(f.srv.read(central(1), f.out, 0), Ok(vec![3, 0]));
        assert_eq!(wr(f.out, &[3, 2]), Ok(None));
        assert_eq!(*f.out_val.lock(), [3, 2]);
        assert_eq!(f.srv.write(central(1), f.out, 1, &[7]), Ok(None));
        assert_eq!(*f.out_val.lock(), [3, 7]);
        assert_eq!(
            f.srv.write(central(2), f.out, 0, &[0, 0]),
            Err(ErrorCode::WriteNotPermitted)
        );

        f.srv.on_disconnect(central(1));
        assert_eq!(f.n.state(f.report), CccdState::Disabled);
    }
}
