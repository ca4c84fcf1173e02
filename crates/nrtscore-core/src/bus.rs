//! Audio and control buses, and control values mapped onto them.
//!
//! Audio bus indices start with the hardware outputs, followed by the
//! hardware inputs; buses allocated by a session come after both. Control
//! buses are allocated from index 0.

use crate::config::SessionOptions;
use crate::error::{Result, SessionError};
use std::fmt;

/// Calculation rate of a bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BusRate {
    Audio,
    Control,
}

impl BusRate {
    /// Prefix scsynth uses for bus-mapped control arguments.
    fn map_prefix(self) -> char {
        match self {
            BusRate::Audio => 'a',
            BusRate::Control => 'c',
        }
    }
}

/// One server bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Bus {
    rate: BusRate,
    index: u32,
}

impl Bus {
    pub fn rate(&self) -> BusRate {
        self.rate
    }

    /// Server bus index.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// The `a<index>` / `c<index>` argument mapping a control onto this bus.
    pub fn map_symbol(&self) -> String {
        format!("{}{}", self.rate.map_prefix(), self.index)
    }
}

impl fmt::Display for Bus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.map_symbol())
    }
}

/// Contiguous run of buses with the same rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BusGroup {
    rate: BusRate,
    index: u32,
    count: u32,
}

impl BusGroup {
    pub fn rate(&self) -> BusRate {
        self.rate
    }

    /// Index of the first bus.
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn len(&self) -> usize {
        self.count as usize
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Bus number `i` of the group.
    pub fn bus(&self, i: usize) -> Option<Bus> {
        let i = u32::try_from(i).ok().filter(|i| *i < self.count)?;
        Some(Bus {
            rate: self.rate,
            index: self.index + i,
        })
    }

    pub fn buses(&self) -> impl Iterator<Item = Bus> + '_ {
        (0..self.len()).filter_map(move |i| self.bus(i))
    }

    /// Multichannel controls read from consecutive buses starting here.
    pub fn first(&self) -> Bus {
        Bus {
            rate: self.rate,
            index: self.index,
        }
    }
}

/// Value of a node control: a constant or a bus it reads from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlValue {
    Number(f32),
    Bus(Bus),
}

impl ControlValue {
    pub fn as_number(&self) -> Option<f32> {
        match self {
            ControlValue::Number(value) => Some(*value),
            ControlValue::Bus(_) => None,
        }
    }

    pub fn as_bus(&self) -> Option<Bus> {
        match self {
            ControlValue::Bus(bus) => Some(*bus),
            ControlValue::Number(_) => None,
        }
    }
}

impl From<f32> for ControlValue {
    fn from(value: f32) -> Self {
        ControlValue::Number(value)
    }
}

impl From<f64> for ControlValue {
    fn from(value: f64) -> Self {
        ControlValue::Number(value as f32)
    }
}

impl From<Bus> for ControlValue {
    fn from(bus: Bus) -> Self {
        ControlValue::Bus(bus)
    }
}

impl From<BusGroup> for ControlValue {
    fn from(group: BusGroup) -> Self {
        ControlValue::Bus(group.first())
    }
}

impl fmt::Display for ControlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlValue::Number(value) => write!(f, "{}", value),
            ControlValue::Bus(bus) => write!(f, "{}", bus),
        }
    }
}

/// Hands out session buses past the hardware channels.
#[derive(Debug, Clone)]
pub struct BusAllocator {
    input_channels: u32,
    output_channels: u32,
    next_audio_bus: u32,
    next_control_bus: u32,
}

impl BusAllocator {
    pub fn new(options: &SessionOptions) -> Self {
        let output_channels = options.output_bus_channel_count;
        let input_channels = options.input_bus_channel_count;
        Self {
            input_channels,
            output_channels,
            next_audio_bus: output_channels.saturating_add(input_channels),
            next_control_bus: 0,
        }
    }

    /// Reserve `count` consecutive buses.
    pub fn allocate(&mut self, rate: BusRate, count: usize) -> Result<BusGroup> {
        let count = u32::try_from(count)
            .ok()
            .filter(|c| *c > 0)
            .ok_or(SessionError::InvalidBusCount(count))?;
        let next = match rate {
            BusRate::Audio => &mut self.next_audio_bus,
            BusRate::Control => &mut self.next_control_bus,
        };
        let index = *next;
        *next = index
            .checked_add(count)
            .ok_or(SessionError::InvalidBusCount(count as usize))?;
        Ok(BusGroup { rate, index, count })
    }

    /// Buses written to the output file.
    pub fn output_bus_group(&self) -> Option<BusGroup> {
        hardware(0, self.output_channels)
    }

    /// Buses read from the input file.
    pub fn input_bus_group(&self) -> Option<BusGroup> {
        hardware(self.output_channels, self.input_channels)
    }
}

fn hardware(index: u32, count: u32) -> Option<BusGroup> {
    (count > 0).then_some(BusGroup {
        rate: BusRate::Audio,
        index,
        count,
    })
}
