//! Client side of the command interface.
//!
//! Commands are encoded the way an external caller would encode them and
//! issued through [`Dispatcher::ioctl`](procgate_core::dispatch::Dispatcher::ioctl), with this process standing in as the
//! caller through `/proc/self/mem`.

use std::error::Error;
use std::hint::black_box;
use std::io;
use std::sync::Arc;

use procgate_core::context::GateContext;
use procgate_core::host::{InputDevice, ProcessTable};
use procgate_core::input::KEY_ESC;
use procgate_core::platform::linux::{ProcfsProcessTable, ProcfsUserMemory, TracingInputDevice};
use procgate_core::types::{Address, ProcessId, UserPtr};
use procgate_core::wire::{
    KeyEvent, MemoryRequest, MouseMoveEvent, IOCTL_KEY_EVENT, IOCTL_MOUSE_MOVE, IOCTL_READ_MEM, IOCTL_WRITE_MEM,
};
use procgate_core::GateConfig;
use procgate_utils::{debug, info};

type ClientResult<T> = Result<T, Box<dyn Error>>;

fn user_ptr(bytes: &[u8]) -> UserPtr
{
    UserPtr::new(bytes.as_ptr() as u64)
}

/// A service instance over procfs plus this process as its caller
pub struct Client
{
    context: GateContext,
    caller: ProcfsUserMemory,
}

impl Client
{
    /// Bring up a service instance with limits from the environment.
    pub fn open() -> ClientResult<Self>
    {
        let processes: Arc<dyn ProcessTable> = Arc::new(ProcfsProcessTable::new());
        let device: Arc<dyn InputDevice> = Arc::new(TracingInputDevice::new());
        let context = GateContext::init(GateConfig::from_env(), processes, Some(device))?;
        let caller = ProcfsUserMemory::open()?;
        Ok(Self { context, caller })
    }

    /// Shut the instance down.
    pub fn close(self)
    {
        let stats = self.context.shutdown();
        debug!(?stats, "client closed");
    }

    /// Issue one command with `payload` as its argument.
    fn ioctl(&self, command: u32, payload: &[u8]) -> io::Result<usize>
    {
        let ret = self
            .context
            .dispatcher()
            .ioctl(&self.caller, command, user_ptr(black_box(payload)));
        usize::try_from(ret).map_err(|_| {
            i32::try_from(-ret).map_or_else(
                |_| io::Error::other(format!("unexpected return code {ret}")),
                io::Error::from_raw_os_error,
            )
        })
    }

    fn memory(&self, command: u32, pid: i32, address: u64, buffer: UserPtr, size: usize) -> io::Result<usize>
    {
        let request = MemoryRequest {
            pid: ProcessId(pid),
            address: Address::new(address),
            size: size as u64,
            buffer,
        };
        self.ioctl(command, &request.encode())
    }

    /// Read `size` bytes at `address` in `pid`, returning what arrived.
    pub fn read(&self, pid: i32, address: u64, size: u64) -> ClientResult<Vec<u8>>
    {
        let mut buffer = vec![0u8; usize::try_from(size)?];
        let destination = UserPtr::new(buffer.as_mut_ptr() as u64);
        let count = self.memory(IOCTL_READ_MEM, pid, address, destination, buffer.len())?;
        // Filled through /proc/self/mem, not through `buffer`.
        buffer = black_box(buffer);
        buffer.truncate(count);
        info!(pid, address, requested = size, count, "read memory");
        Ok(buffer)
    }

    /// Write `data` at `address` in `pid`, returning how much landed.
    pub fn write(&self, pid: i32, address: u64, data: &[u8]) -> ClientResult<usize>
    {
        let count = self.memory(IOCTL_WRITE_MEM, pid, address, user_ptr(data), data.len())?;
        info!(pid, address, requested = data.len(), count, "wrote memory");
        Ok(count)
    }

    pub fn mouse_move(&self, dx: i32, dy: i32) -> ClientResult<()>
    {
        self.ioctl(IOCTL_MOUSE_MOVE, &MouseMoveEvent { dx, dy }.encode())?;
        Ok(())
    }

    /// Press, then release.
    pub fn tap_key(&self, code: i32) -> ClientResult<()>
    {
        self.ioctl(IOCTL_KEY_EVENT, &KeyEvent { code, pressed: true }.encode())?;
        self.ioctl(IOCTL_KEY_EVENT, &KeyEvent { code, pressed: false }.encode())?;
        Ok(())
    }

    /// Exercise every command against this process and report each step.
    pub fn selftest(&self) -> ClientResult<()>
    {
        let pid = i32::try_from(std::process::id())?;
        let source: Vec<u8> = (0..=255u8).cycle().take(3 * 4096 + 17).collect();
        let source = black_box(source);

        let copy = self.read(pid, source.as_ptr() as u64, source.len() as u64)?;
        if copy != source {
            return Err(format!("read back {} bytes that differ from the source", copy.len()).into());
        }
        println!("READ_MEM   ok ({} bytes)", copy.len());

        let mut target = vec![0u8; source.len()];
        let written = self.write(pid, target.as_mut_ptr() as u64, &source)?;
        target = black_box(target);
        if written != source.len() || target != source {
            return Err(format!("wrote {written} bytes but the target does not match").into());
        }
        println!("WRITE_MEM  ok ({written} bytes)");

        match self.read(0, source.as_ptr() as u64, 1) {
            Err(e) => println!("pid 0      rejected ({e})"),
            Ok(_) => return Err("a read from pid 0 was accepted".into()),
        }

        self.mouse_move(0, 0)?;
        println!("MOUSE_MOVE ok");
        self.tap_key(i32::from(KEY_ESC))?;
        println!("KEY_EVENT  ok");
        Ok(())
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_read_lands_in_returned_buffer()
    {
        let client = Client::open().unwrap();
        let pid = i32::try_from(std::process::id()).unwrap();
        let source = black_box(b"procgate client read".to_vec());

        let copy = client.read(pid, source.as_ptr() as u64, source.len() as u64).unwrap();
        assert_eq!(copy, source);

        let short = client.read(pid, source.as_ptr() as u64, 8).unwrap();
        assert_eq!(short, &source[..8]);
        client.close();
    }
}
