//! Bus side of a node.
//!
//! A [`Node`] owns the register store, the board driver and the hardware. The bus transport
//! calls [`Node::read`] and [`Node::write_register`] for every request it decodes; the
//! application loop calls [`Node::process`] periodically.

use fugit::SecsDurationU32;
use log::{debug, info, warn};
use strum::EnumCount;

use crate::{
    codec::{apply_mask, field_bits, read_field},
    config::NodeConfig,
    error::{Error, ErrorBase, Result},
    hal::Hardware,
    nodes::{common, Board, NodeDriver},
    nvm,
    register::RegisterStore,
    registers::common::{error_stack, Register as CommonRegister},
    types::{AdcStatus, BoardId},
};

/// First address owned by the board driver.
const BOARD_REGISTERS: u8 = CommonRegister::COUNT as u8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Uninitialized,
    Ready,
}

/// You can create a Node for any board implementing the [`Hardware`] traits.
///
/// Requests are refused with [`Error::Uninitialized`] until [`Node::init`] succeeded. Every
/// failed write leaves its status code in the ERROR_STACK register.
pub struct Node<H: Hardware> {
    config: NodeConfig,
    regs: RegisterStore,
    board: Board,
    hw: H,
    state: NodeState,
}

impl<H: Hardware> Node<H> {
    pub fn new(config: NodeConfig, hw: H) -> Result<Self> {
        let board = Board::new(&config.board);
        let regs = RegisterStore::new(board.access())?;
        Ok(Self {
            config,
            regs,
            board,
            hw,
            state: NodeState::Uninitialized,
        })
    }

    /// Fill every register, from the configuration, the NVM and the hardware state.
    pub fn init(&mut self) -> Result<()> {
        self.state = NodeState::Uninitialized;
        if self.config.factory_reset {
            self.factory_reset()?;
        }
        common::init_registers(&mut self.regs, &mut self.hw, &self.config)?;
        self.board.init_registers(&mut self.regs, &mut self.hw)?;
        self.state = NodeState::Ready;
        info!("{:?} node ready", self.board.id());
        Ok(())
    }

    fn factory_reset(&mut self) -> Result<()> {
        for (addr, defaults) in self.board.factory_defaults() {
            let persisted = nvm::read_register(&mut self.hw, addr)?;
            nvm::write_register(
                &mut self.hw,
                addr,
                apply_mask(persisted, defaults.mask, defaults.value),
            )?;
        }
        info!("factory defaults restored");
        Ok(())
    }

    fn check_ready(&self) -> Result<()> {
        match self.state {
            NodeState::Ready => Ok(()),
            NodeState::Uninitialized => Err(Error::Uninitialized),
        }
    }

    fn update_register(&mut self, addr: u8) -> Result<()> {
        if addr < BOARD_REGISTERS {
            return Ok(());
        }
        self.board.update_register(&mut self.regs, &mut self.hw, addr)
    }

    /// Bus read.
    ///
    /// The register is refreshed first. A failed refresh is logged and the stored contents are
    /// returned anyway.
    pub fn read(&mut self, addr: u8) -> Result<u32> {
        self.check_ready()?;
        if let Err(err) = self.update_register(addr) {
            warn!("register {} not refreshed: {}", addr, err);
        }
        self.regs.read(addr)
    }

    /// Refresh and read register `addr`, failing if the refresh fails.
    pub fn read_register(&mut self, addr: u8) -> Result<u32> {
        self.check_ready()?;
        self.update_register(addr)?;
        self.regs.read(addr)
    }

    pub fn read_field(&mut self, addr: u8, mask: u32) -> Result<u32> {
        Ok(read_field(self.read_register(addr)?, mask))
    }

    /// Bus write of the `mask` bits of `value` into register `addr`.
    pub fn write_register(&mut self, addr: u8, mask: u32, value: u32) -> Result<()> {
        self.check_ready()?;
        let result = self.handle_write(addr, mask, value);
        if let Err(err) = result {
            warn!("write to register {} failed: {}", addr, err);
            self.record_error(err);
        }
        result
    }

    pub fn write_field(&mut self, addr: u8, mask: u32, field: u32) -> Result<()> {
        self.write_register(addr, mask, field_bits(field, mask))
    }

    fn handle_write(&mut self, addr: u8, mask: u32, value: u32) -> Result<()> {
        self.regs.check_external_write(addr)?;
        self.regs.write(addr, mask, value)?;
        debug!("register {} written ({:#010x} mask {:#010x})", addr, value, mask);
        if addr >= BOARD_REGISTERS {
            return self.board.check_register(&mut self.regs, &mut self.hw, addr, mask);
        }
        if common::check_register(&mut self.regs, &mut self.hw, addr, mask)? {
            self.run_measurements()?;
        }
        Ok(())
    }

    /// Run a full measurement cycle: board channels first, then the MCU.
    pub fn measure(&mut self) -> Result<AdcStatus> {
        self.check_ready()?;
        let result = self.run_measurements();
        if let Err(err) = result {
            self.record_error(err);
        }
        result
    }

    fn run_measurements(&mut self) -> Result<AdcStatus> {
        let board = self.board.mtrg_callback(&mut self.regs, &mut self.hw);
        let mcu = common::mtrg_callback(&mut self.regs, &mut self.hw);
        let status = match (board?, mcu?) {
            (AdcStatus::Failure(err), _) | (_, AdcStatus::Failure(err)) => {
                AdcStatus::Failure(err)
            }
            _ => AdcStatus::Success,
        };
        if let AdcStatus::Failure(err) = status {
            warn!("measurement incomplete: {:?}", err);
            self.record_error(Error::from_hal(ErrorBase::Adc, err));
        }
        Ok(status)
    }

    /// Background task of the board, to call every `period`.
    pub fn process(&mut self, period: SecsDurationU32) -> Result<()> {
        self.check_ready()?;
        let result = self.board.process(&mut self.regs, &mut self.hw, period);
        if let Err(err) = result {
            warn!("background task failed: {}", err);
            self.record_error(err);
        }
        result
    }

    fn record_error(&mut self, err: Error) {
        let code = err.code() as u32;
        if let Err(write_err) =
            self.regs.write_field(CommonRegister::ErrorStack, error_stack::ERROR, code)
        {
            warn!("error {:#06x} not recorded: {}", code, write_err);
        }
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    pub fn board_id(&self) -> BoardId {
        self.board.id()
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Register contents as last written, without refreshing.
    pub fn registers(&self) -> &RegisterStore {
        &self.regs
    }

    pub fn hardware(&self) -> &H {
        &self.hw
    }

    pub fn hardware_mut(&mut self) -> &mut H {
        &mut self.hw
    }

    /// Give the hardware back, dropping the node.
    pub fn release(self) -> H {
        self.hw
    }
}
